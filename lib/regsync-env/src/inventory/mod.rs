//! Inventory implementations.

mod file;
pub use self::file::FileInventory;
