//! Redis adapter for brokered deployment.
//!
//! This module provides Redis-backed implementations of:
//! - `JobQueuePort` - one list per priority band
//! - the broker sink of the event bus (`PUBLISH` on `video-events`)

mod error;
mod pool;
mod publisher;
mod queue;

pub use error::QueueError;
pub use pool::RedisPool;
pub use publisher::RedisPublisher;
pub use queue::RedisJobQueue;

/// Redis key constants
const JOB_QUEUE_LOW: &str = "caruso:transcode_jobs:low";
const JOB_QUEUE_MEDIUM: &str = "caruso:transcode_jobs:medium";
const JOB_QUEUE_HIGH: &str = "caruso:transcode_jobs:high";

/// Dequeue order: the low-resolution band drains first so a playable
/// rendition exists as early as possible.
const JOB_QUEUES_BY_PRIORITY: [&str; 3] = [JOB_QUEUE_LOW, JOB_QUEUE_MEDIUM, JOB_QUEUE_HIGH];

/// Broker channel carrying JSON-serialized video events.
pub const EVENT_CHANNEL: &str = "video-events";
