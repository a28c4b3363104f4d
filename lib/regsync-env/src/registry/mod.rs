//! Service registry implementations.

mod http;
pub use self::http::{RegistryClient, RegistryClientConfiguration, RegistryError};

mod memory;
pub use self::memory::MemoryRegistry;
