//! In-process job queue for broker-less (degraded) mode.
//!
//! Same discipline as the Redis queue - FIFO within a band, low resolution
//! drains first - so the worker pool cannot tell the transports apart.

use crate::domain::QueuedJob;
use crate::ports::queue::JobQueuePort;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Default)]
pub struct LocalJobQueue {
    bands: Mutex<[VecDeque<QueuedJob>; 3]>,
    notify: Notify,
}

impl LocalJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn try_pop(&self) -> Option<QueuedJob> {
        let mut bands = self.bands.lock().unwrap();
        bands.iter_mut().find_map(|band| band.pop_front())
    }
}

#[async_trait]
impl JobQueuePort for LocalJobQueue {
    async fn enqueue(&self, job: QueuedJob) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let band = job.resolution.priority() as usize - 1;
        self.bands.lock().unwrap()[band].push_back(job);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(
        &self,
        timeout_secs: f64,
    ) -> Result<Option<QueuedJob>, Box<dyn std::error::Error + Send + Sync>> {
        loop {
            if let Some(job) = self.try_pop() {
                return Ok(Some(job));
            }
            if timeout_secs > 0.0 {
                let wait = Duration::from_secs_f64(timeout_secs);
                if tokio::time::timeout(wait, self.notify.notified())
                    .await
                    .is_err()
                {
                    return Ok(None);
                }
            } else {
                self.notify.notified().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{QueuedJob, Resolution};
    use std::path::PathBuf;

    fn job(resolution: Resolution, id: &str) -> QueuedJob {
        QueuedJob {
            job_id: id.to_string(),
            video_id: "vid".to_string(),
            resolution,
            input_path: PathBuf::from("in.mp4"),
        }
    }

    #[tokio::test]
    async fn dequeues_low_before_medium_before_high() {
        let queue = LocalJobQueue::new();
        queue.enqueue(job(Resolution::High, "h")).await.unwrap();
        queue.enqueue(job(Resolution::Low, "l")).await.unwrap();
        queue.enqueue(job(Resolution::Medium, "m")).await.unwrap();

        let order: Vec<String> = [
            queue.dequeue(0.1).await.unwrap().unwrap(),
            queue.dequeue(0.1).await.unwrap().unwrap(),
            queue.dequeue(0.1).await.unwrap().unwrap(),
        ]
        .into_iter()
        .map(|j| j.job_id)
        .collect();
        assert_eq!(order, ["l", "m", "h"]);
    }

    #[tokio::test]
    async fn fifo_within_a_band() {
        let queue = LocalJobQueue::new();
        queue.enqueue(job(Resolution::Low, "first")).await.unwrap();
        queue.enqueue(job(Resolution::Low, "second")).await.unwrap();

        assert_eq!(queue.dequeue(0.1).await.unwrap().unwrap().job_id, "first");
        assert_eq!(queue.dequeue(0.1).await.unwrap().unwrap().job_id, "second");
    }

    #[tokio::test]
    async fn empty_queue_times_out_with_none() {
        let queue = LocalJobQueue::new();
        assert!(queue.dequeue(0.05).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn blocked_dequeue_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(LocalJobQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.dequeue(0.0).await.unwrap() })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.enqueue(job(Resolution::Medium, "m")).await.unwrap();
        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.job_id, "m");
    }
}
