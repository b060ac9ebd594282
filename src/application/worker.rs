//! Worker pool: bounded-concurrency execution of transcoding jobs with
//! per-job retry and coherent progress reporting.

use crate::domain::{
    EventKind, JobStatus, JobUpdate, QueuedJob, VideoEvent, VideoStatus, VideoUpdate,
};
use crate::encoder::Transcoder;
use crate::events::EventBus;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::{StateStore, StoreResult};
use crate::storage::StorageLayout;
use chrono::Utc;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Concurrent jobs per worker.
pub const WORKER_JOB_SLOTS: usize = 2;
/// At most this many job starts per rolling window.
pub const WORKER_STARTS_PER_WINDOW: usize = 3;
pub const START_WINDOW: Duration = Duration::from_secs(60);
/// Attempts per job; backoff doubles from the base delay.
pub const RETRY_ATTEMPTS: u32 = 3;
pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(1);
/// Progress is persisted and emitted only when it advanced at least this
/// much since the last emission, or on 100.
pub const PROGRESS_STEP: f64 = 5.0;

pub struct WorkerPool {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn JobQueuePort>,
    bus: Arc<EventBus>,
    transcoder: Arc<dyn Transcoder>,
    layout: StorageLayout,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn StateStore>,
        queue: Arc<dyn JobQueuePort>,
        bus: Arc<EventBus>,
        transcoder: Arc<dyn Transcoder>,
        layout: StorageLayout,
    ) -> Self {
        Self {
            store,
            queue,
            bus,
            transcoder,
            layout,
        }
    }

    /// Spawn the dispatch loop: acquire a job slot, respect the start rate,
    /// dequeue, process on its own task.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("transcoding worker started");
            let slots = Arc::new(Semaphore::new(WORKER_JOB_SLOTS));
            let mut recent_starts: VecDeque<Instant> = VecDeque::new();
            loop {
                let permit = slots
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("job slot semaphore closed");
                throttle_starts(&mut recent_starts).await;

                match self.queue.dequeue(0.0).await {
                    Ok(Some(job)) => {
                        recent_starts.push_back(Instant::now());
                        let pool = self.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            pool.process(job).await;
                        });
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        error!("queue error: {}", e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        })
    }

    pub async fn process(&self, queued: QueuedJob) {
        if let Err(e) = self.run_job(&queued).await {
            error!(job = %queued.job_id, "job processing error: {}", e);
        }
    }

    async fn run_job(&self, queued: &QueuedJob) -> StoreResult<()> {
        let resolution = queued.resolution;

        let started = self
            .store
            .update_job(
                &queued.job_id,
                JobUpdate {
                    status: Some(JobStatus::Processing),
                    started_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;
        if started.is_none() {
            // Video deleted between enqueue and dequeue: tolerated no-op.
            debug!(job = %queued.job_id, "job record gone before start");
            return Ok(());
        }
        if let Some(video) = self.store.get_video(&queued.video_id).await? {
            if matches!(
                video.status,
                VideoStatus::Queued | VideoStatus::UploadCompleted
            ) {
                self.store
                    .update_video(
                        &queued.video_id,
                        VideoUpdate {
                            status: Some(VideoStatus::Transcoding),
                            ..Default::default()
                        },
                    )
                    .await?;
            }
        }
        self.bus.emit(VideoEvent::with_data(
            EventKind::TranscodingStarted,
            &queued.video_id,
            json!({ "resolution": resolution }),
        ));
        self.bus.emit(VideoEvent::with_data(
            EventKind::TranscodingProgress,
            &queued.video_id,
            json!({ "resolution": resolution, "progress": 0.0 }),
        ));

        let output_dir = self.layout.resolution_dir(&queued.video_id, resolution);
        // Carried across attempts so a retry restarting from zero can never
        // emit a lower percent than already reported.
        let mut last_emitted = 0.0_f64;

        for attempt in 1..=RETRY_ATTEMPTS {
            let (tx, rx) = mpsc::unbounded_channel();
            let reporter = self.spawn_progress_reporter(queued.clone(), rx, last_emitted);
            let result = self
                .transcoder
                .transcode(&queued.input_path, &output_dir, resolution, tx)
                .await;
            // Join before any terminal write so events for this (video,
            // resolution) stay in emission order.
            last_emitted = reporter.await.unwrap_or(last_emitted);

            match result {
                Ok(_) => {
                    let url = StorageLayout::playlist_url(&queued.video_id, resolution);
                    if self
                        .store
                        .complete_job_resolution(&queued.job_id, &url)
                        .await?
                        .is_none()
                    {
                        debug!(job = %queued.job_id, "video deleted mid-transcode");
                    }
                    self.bus.emit(VideoEvent::with_data(
                        EventKind::TranscodingCompleted,
                        &queued.video_id,
                        json!({ "resolution": resolution, "url": url }),
                    ));
                    info!(video = %queued.video_id, %resolution, "transcode completed");
                    return Ok(());
                }
                Err(e) if attempt < RETRY_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    warn!(
                        job = %queued.job_id, attempt,
                        "encode attempt failed: {}; retrying in {:?}", e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    let message = e.to_string();
                    error!(job = %queued.job_id, "transcode failed: {}", message);
                    self.store
                        .update_job(
                            &queued.job_id,
                            JobUpdate {
                                status: Some(JobStatus::Failed),
                                error_message: Some(message.clone()),
                                completed_at: Some(Utc::now()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    self.store
                        .update_video(
                            &queued.video_id,
                            VideoUpdate {
                                status: Some(VideoStatus::Failed),
                                error_message: Some(message.clone()),
                                ..Default::default()
                            },
                        )
                        .await?;
                    self.bus.emit(VideoEvent::with_data(
                        EventKind::TranscodingFailed,
                        &queued.video_id,
                        json!({ "resolution": resolution, "error": message }),
                    ));
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Consume raw encoder percent, apply the emission step, persist job and
    /// video progress, emit. Returns the last emitted value.
    fn spawn_progress_reporter(
        &self,
        queued: QueuedJob,
        mut rx: mpsc::UnboundedReceiver<f64>,
        mut last: f64,
    ) -> JoinHandle<f64> {
        let store = self.store.clone();
        let bus = self.bus.clone();
        tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                let percent = (raw * 100.0).round() / 100.0;
                let advanced = percent - last >= PROGRESS_STEP;
                let finished = percent >= 100.0 && last < 100.0;
                if !advanced && !finished {
                    continue;
                }
                last = percent;
                let _ = store
                    .update_job(
                        &queued.job_id,
                        JobUpdate {
                            progress: Some(percent),
                            ..Default::default()
                        },
                    )
                    .await;
                let _ = store
                    .update_video(
                        &queued.video_id,
                        VideoUpdate {
                            transcoding_progress: Some((queued.resolution, percent)),
                            ..Default::default()
                        },
                    )
                    .await;
                bus.emit(VideoEvent::with_data(
                    EventKind::TranscodingProgress,
                    &queued.video_id,
                    json!({ "resolution": queued.resolution, "progress": percent }),
                ));
            }
            last
        })
    }
}

async fn throttle_starts(recent: &mut VecDeque<Instant>) {
    loop {
        let now = Instant::now();
        while recent
            .front()
            .is_some_and(|t| now.duration_since(*t) >= START_WINDOW)
        {
            recent.pop_front();
        }
        if recent.len() < WORKER_STARTS_PER_WINDOW {
            return;
        }
        let oldest = *recent.front().unwrap();
        tokio::time::sleep_until(oldest + START_WINDOW).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{Resolution, TranscodingJob, Video};
    use crate::encoder::driver::MockTranscoder;
    use crate::events::{EventBus, EventHub};
    use crate::ports::queue::MockJobQueuePort;
    use std::path::PathBuf;

    struct Fixture {
        store: Arc<MemoryStore>,
        hub: Arc<EventHub>,
        video: Video,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mut video = Video::new("clip.mp4", 5_000_000, "video/mp4");
        video.status = VideoStatus::Queued;
        store.create_video(video.clone()).await.unwrap();
        Fixture {
            store,
            hub: Arc::new(EventHub::new()),
            video,
        }
    }

    fn pool_with(fixture: &Fixture, transcoder: MockTranscoder) -> WorkerPool {
        WorkerPool::new(
            fixture.store.clone(),
            Arc::new(MockJobQueuePort::new()),
            Arc::new(EventBus::new(fixture.hub.clone(), None)),
            Arc::new(transcoder),
            StorageLayout::new("/tmp/caruso-test"),
        )
    }

    async fn seed_job(fixture: &Fixture, resolution: Resolution) -> QueuedJob {
        let job = TranscodingJob::new(&fixture.video.id, resolution, PathBuf::from("in.mp4"));
        fixture.store.create_job(job.clone()).await.unwrap();
        QueuedJob::from_job(&job)
    }

    #[tokio::test]
    async fn successful_job_completes_with_throttled_progress() {
        let fixture = fixture().await;
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_transcode()
            .times(1)
            .returning(|_, out, _, tx| {
                for percent in [2.0, 10.0, 12.0, 40.0, 100.0] {
                    tx.send(percent).unwrap();
                }
                Ok(out.join("playlist.m3u8"))
            });
        let pool = pool_with(&fixture, transcoder);
        let queued = seed_job(&fixture, Resolution::Low).await;
        let mut rx = fixture.hub.subscribe();

        pool.process(queued.clone()).await;

        let job = fixture
            .store
            .get_job(&queued.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100.0);
        assert_eq!(
            job.output_path.as_deref(),
            Some(format!("/stream/{}/low/playlist.m3u8", fixture.video.id).as_str())
        );

        let video = fixture
            .store
            .get_video(&fixture.video.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(video.status, VideoStatus::Transcoding);
        assert_eq!(video.transcoding_progress[&Resolution::Low], 100.0);
        assert!(video.hls_urls.contains_key(&Resolution::Low));

        // Started, progress 0, then 10 / 40 / 100 (2 and 12 are under the
        // emission step), then completed.
        let mut kinds = Vec::new();
        let mut progress_values = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if event.kind == EventKind::TranscodingProgress {
                progress_values.push(event.data.unwrap()["progress"].as_f64().unwrap());
            }
            kinds.push(event.kind);
        }
        assert_eq!(kinds.first(), Some(&EventKind::TranscodingStarted));
        assert_eq!(kinds.last(), Some(&EventKind::TranscodingCompleted));
        assert_eq!(progress_values, vec![0.0, 10.0, 40.0, 100.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_job_retries_then_marks_video_failed() {
        let fixture = fixture().await;
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_transcode()
            .times(RETRY_ATTEMPTS as usize)
            .returning(|_, _, _, _| {
                Err(crate::encoder::EncodeError::Failed {
                    status: 1,
                    detail: "no such codec".into(),
                })
            });
        let pool = pool_with(&fixture, transcoder);
        let queued = seed_job(&fixture, Resolution::Medium).await;
        let mut rx = fixture.hub.subscribe();

        pool.process(queued.clone()).await;

        let job = fixture
            .store
            .get_job(&queued.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap().contains("status 1"));

        let video = fixture
            .store
            .get_video(&fixture.video.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert!(video.error_message.is_some());

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(kinds.last(), Some(&EventKind::TranscodingFailed));
    }

    #[tokio::test(start_paused = true)]
    async fn one_failed_resolution_fails_the_video_but_keeps_other_urls() {
        let fixture = fixture().await;
        let mut transcoder = MockTranscoder::new();
        transcoder.expect_transcode().returning(|_, out, res, tx| {
            if res == Resolution::Medium {
                Err(crate::encoder::EncodeError::Failed {
                    status: 187,
                    detail: "encoder crashed".into(),
                })
            } else {
                tx.send(100.0).unwrap();
                Ok(out.join("playlist.m3u8"))
            }
        });
        let pool = pool_with(&fixture, transcoder);

        for resolution in Resolution::ALL {
            let queued = seed_job(&fixture, resolution).await;
            pool.process(queued).await;
        }

        let video = fixture
            .store
            .get_video(&fixture.video.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(video.status, VideoStatus::Failed);
        assert!(video.hls_urls.contains_key(&Resolution::Low));
        assert!(video.hls_urls.contains_key(&Resolution::High));
        assert!(!video.hls_urls.contains_key(&Resolution::Medium));
        assert!(video.completed_at.is_none());
    }

    #[tokio::test]
    async fn all_three_successes_complete_the_video() {
        let fixture = fixture().await;
        let mut transcoder = MockTranscoder::new();
        transcoder
            .expect_transcode()
            .times(3)
            .returning(|_, out, _, tx| {
                tx.send(100.0).unwrap();
                Ok(out.join("playlist.m3u8"))
            });
        let pool = pool_with(&fixture, transcoder);

        for resolution in Resolution::ALL {
            let queued = seed_job(&fixture, resolution).await;
            pool.process(queued).await;
        }

        let video = fixture
            .store
            .get_video(&fixture.video.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(video.status, VideoStatus::Completed);
        assert!(video.completed_at.is_some());
        assert_eq!(video.hls_urls.len(), 3);
    }

    #[tokio::test]
    async fn job_for_deleted_video_is_a_no_op() {
        let fixture = fixture().await;
        let queued = seed_job(&fixture, Resolution::Low).await;
        fixture.store.delete_video(&fixture.video.id).await.unwrap();

        // The transcoder must never run for a vanished job.
        let pool = pool_with(&fixture, MockTranscoder::new());
        pool.process(queued).await;
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeding_on_second_attempt_completes_the_job() {
        let fixture = fixture().await;
        let mut transcoder = MockTranscoder::new();
        let mut calls = 0;
        transcoder
            .expect_transcode()
            .times(2)
            .returning(move |_, out, _, tx| {
                calls += 1;
                if calls == 1 {
                    Err(crate::encoder::EncodeError::Failed {
                        status: 1,
                        detail: "transient".into(),
                    })
                } else {
                    tx.send(100.0).unwrap();
                    Ok(out.join("playlist.m3u8"))
                }
            });
        let pool = pool_with(&fixture, transcoder);
        let queued = seed_job(&fixture, Resolution::High).await;

        pool.process(queued.clone()).await;

        let job = fixture
            .store
            .get_job(&queued.job_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }
}
