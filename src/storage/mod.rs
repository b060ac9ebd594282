//! Storage layout discipline and background reclamation.

pub mod gc;
pub mod layout;

pub use gc::{GarbageCollector, StorageStats};
pub use layout::StorageLayout;
