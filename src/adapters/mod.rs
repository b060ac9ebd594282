//! Adapters layer - Concrete implementations of the ports.

pub mod local_queue;
pub mod memory;
pub mod redis;
