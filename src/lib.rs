//! Caruso - Multi-Resolution Transcoding Service
//!
//! Hexagonal Architecture:
//! - domain/: Pure records and enums (videos, sessions, jobs, events)
//! - ports/: Trait definitions (state store, job queue)
//! - adapters/: Concrete implementations (in-memory store, Redis, local queue)
//! - application/: Generic services (upload coordinator, worker pool)
//! - encoder/: ffmpeg driver and progress parsing
//! - events/: In-process hub plus optional broker fan-out
//! - storage/: On-disk layout and garbage collection
//! - http/: REST surface, streaming reads, live client gateway
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod encoder;
pub mod events;
pub mod http;
pub mod ports;
pub mod storage;

// Re-exports for convenience
pub use adapters::local_queue::LocalJobQueue;
pub use adapters::memory::MemoryStore;
pub use adapters::redis::{RedisJobQueue, RedisPool, RedisPublisher};
pub use application::{UploadCoordinator, WorkerPool};
pub use config::Config;
pub use events::{EventBus, EventHub};
pub use storage::{GarbageCollector, StorageLayout};
