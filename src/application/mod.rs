//! Application layer - Generic services.

pub mod coordinator;
pub mod worker;

pub use coordinator::{UploadCoordinator, UploadError};
pub use worker::WorkerPool;
