//! Implementations of the collaborators the reconciliation engine talks to.
//!
//! The registry is reached over HTTP with [`RegistryClient`], or simulated in memory with [`MemoryRegistry`] for
//! offline runs. Host and environment information comes from an inventory snapshot file, see [`FileInventory`].

pub mod inventory;
pub mod registry;
pub mod retry;

pub use self::inventory::FileInventory;
pub use self::registry::{MemoryRegistry, RegistryClient, RegistryClientConfiguration};
pub use self::retry::RetryPolicy;
