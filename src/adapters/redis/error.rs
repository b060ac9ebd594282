//! Redis error type for the brokered adapter.

use deadpool_redis::{CreatePoolError, PoolError};
use thiserror::Error;

pub type RedisError = deadpool_redis::redis::RedisError;

/// Anything the brokered queue or event publisher can fail on. Broker
/// absence is not special-cased here; callers decide whether a failure is
/// fatal (queue) or swallowed (event sink).
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("redis command failed: {0}")]
    Redis(#[from] RedisError),
    #[error("redis pool unavailable: {0}")]
    Pool(#[from] PoolError),
    #[error("job payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("redis pool configuration rejected: {0}")]
    CreatePool(#[from] CreatePoolError),
}
