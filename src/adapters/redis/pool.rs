//! Redis connection pool.

use super::error::QueueError;
use deadpool_redis::{Config, Connection, Pool, Runtime};

/// Shared pool behind the brokered job queue and the event publisher.
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
}

impl RedisPool {
    /// Build the pool and round-trip a PING, so a dead broker is detected
    /// at startup (selecting local mode) rather than on the first enqueue.
    pub async fn connect(redis_url: &str) -> Result<Self, QueueError> {
        let cfg = Config::from_url(redis_url);
        let pool = Self {
            pool: cfg.create_pool(Some(Runtime::Tokio1))?,
        };
        let mut conn = pool.conn().await?;
        deadpool_redis::redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await?;
        Ok(pool)
    }

    /// Checked-out connection for one command sequence.
    pub(super) async fn conn(&self) -> Result<Connection, QueueError> {
        Ok(self.pool.get().await?)
    }
}
