//! Configuration resolution and reconciliation engine.
//!
//! Given a catalog of templated service descriptions, the variables of the hosts backing each service, and the
//! registry's current view of an environment, this crate works out what each service's registry entry should look
//! like, compares it with what is there, and decides whether to add, recreate, skip or fail it.
//!
//! Nothing here talks to the network directly. Collaborators that do, the host [`Inventory`] and the service
//! [`Registry`], are traits implemented elsewhere.
//!
//! The pieces, leaves first:
//!
//! - [`vars`]: host variables and the environment scope they are resolved in.
//! - [`resolve`]: turning a [`ServiceTemplate`] plus hosts into concrete [`ResolvedServiceConfig`]s.
//! - [`normalize`] and [`diff`]: putting the registry's records into the same shape and comparing.
//! - [`scheme`]: instantiating deployment scheme templates from an environment's topology.
//! - [`reconcile`]: the per-service decision logic and the bounded worker pool driving it.

pub mod catalog;
pub mod diff;
pub mod discovery;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod reconcile;
pub mod resolve;
pub mod scheme;
pub mod sources;
pub mod vars;

pub use self::catalog::{ServiceCatalog, ServiceTemplate};
pub use self::diff::ConfigDiff;
pub use self::error::FatalError;
pub use self::normalize::{CurrentRegistry, CurrentServiceConfig, NativeServiceRecord};
pub use self::resolve::{ResolutionError, ResolvedServiceConfig, ServiceConfigResolver};
pub use self::sources::{EnvironmentInfo, Inventory, Registry};
pub use self::vars::{EnvironmentScope, HostVariableSet};
