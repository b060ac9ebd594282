//! Broker sink: PUBLISH serialized events on the shared channel.

use super::error::QueueError;
use super::pool::RedisPool;
use super::EVENT_CHANNEL;
use crate::domain::VideoEvent;
use deadpool_redis::redis::AsyncCommands;

/// Fire-and-forget publisher for cross-process event fan-out. The event bus
/// swallows and logs any error returned here; a missing broker never blocks
/// emission.
#[derive(Clone)]
pub struct RedisPublisher {
    pool: RedisPool,
}

impl RedisPublisher {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }

    pub async fn publish(&self, event: &VideoEvent) -> Result<(), QueueError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.pool.conn().await?;
        conn.publish::<_, _, ()>(EVENT_CHANNEL, payload).await?;
        Ok(())
    }
}
