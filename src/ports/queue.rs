use crate::domain::QueuedJob;
use async_trait::async_trait;
use std::error::Error;

/// Transport for transcoding jobs between the coordinator and the worker
/// pool. FIFO within a priority band; lower-priority-number resolutions are
/// dequeued first.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobQueuePort: Send + Sync {
    /// Enqueue a job in the band for its resolution.
    async fn enqueue(&self, job: QueuedJob) -> Result<(), Box<dyn Error + Send + Sync>>;

    /// Dequeue the next job, highest priority band first.
    /// timeout_secs: 0.0 blocks indefinitely, >0.0 returns None on timeout.
    async fn dequeue(
        &self,
        timeout_secs: f64,
    ) -> Result<Option<QueuedJob>, Box<dyn Error + Send + Sync>>;
}
