//! Redis JobQueuePort implementation.

use super::error::QueueError;
use super::pool::RedisPool;
use super::JOB_QUEUES_BY_PRIORITY;
use crate::domain::{QueuedJob, Resolution};
use crate::ports::queue::JobQueuePort;
use async_trait::async_trait;
use deadpool_redis::redis::AsyncCommands;

fn queue_key(resolution: Resolution) -> &'static str {
    JOB_QUEUES_BY_PRIORITY[resolution.priority() as usize - 1]
}

/// Job queue backed by one Redis list per priority band.
#[derive(Clone)]
pub struct RedisJobQueue {
    pool: RedisPool,
}

impl RedisJobQueue {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueuePort for RedisJobQueue {
    async fn enqueue(&self, job: QueuedJob) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.conn().await?;
        let json = serde_json::to_string(&job)?;
        conn.lpush::<_, _, ()>(queue_key(job.resolution), json)
            .await
            .map_err(QueueError::from)?;
        Ok(())
    }

    async fn dequeue(
        &self,
        timeout_secs: f64,
    ) -> Result<Option<QueuedJob>, Box<dyn std::error::Error + Send + Sync>> {
        let mut conn = self.pool.conn().await?;

        // Drain bands in priority order without blocking first.
        for key in JOB_QUEUES_BY_PRIORITY {
            let popped: Option<String> = conn.rpop(key, None).await.map_err(QueueError::from)?;
            if let Some(json) = popped {
                return Ok(Some(serde_json::from_str(&json)?));
            }
        }

        // All bands empty: block across all three. BRPOP checks keys in
        // argument order, which preserves the priority discipline.
        let result: Option<(String, String)> = conn
            .brpop(&JOB_QUEUES_BY_PRIORITY[..], timeout_secs)
            .await
            .map_err(QueueError::from)?;
        match result {
            Some((_, json)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}
