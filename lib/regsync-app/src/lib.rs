//! Process bootstrap helpers.
//!
//! Everything the binary needs to do before it can start reconciling: currently, that is setting up logging.
#![deny(missing_docs)]

pub mod logging;

/// Common imports.
pub mod prelude {
    pub use super::logging::{fatal_and_exit, initialize_logging, LoggingConfiguration};
}
