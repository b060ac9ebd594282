//! Upload coordinator: session lifecycle, chunk intake, assembly and the
//! three-way transcoding fan-out.

use crate::domain::{
    EventKind, QueuedJob, Resolution, SessionStatus, TranscodingJob, UploadSession, Video,
    VideoEvent, VideoStatus, VideoUpdate,
};
use crate::events::EventBus;
use crate::ports::queue::JobQueuePort;
use crate::ports::repository::StateStore;
use crate::storage::{GarbageCollector, StorageLayout};
use serde::Serialize;
use serde_json::json;
use std::io;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{info, warn};

/// Fixed chunk size handed to clients at session create. The assembler
/// itself is chunk-size-agnostic.
pub const CHUNK_SIZE: u64 = 2 * 1024 * 1024;
/// Hard cap on a declared upload.
pub const MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024 * 1024;
/// Per-request chunk body cap; clients get headroom above CHUNK_SIZE.
pub const MAX_CHUNK_BODY: u64 = 10 * 1024 * 1024;
/// Missing indices reported on an incomplete complete, capped for
/// readability.
pub const MISSING_CHUNKS_CAP: usize = 10;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("{0}")]
    Validation(String),
    #[error("upload session not found")]
    SessionNotFound,
    #[error("video not found")]
    VideoNotFound,
    #[error("chunk exceeds the allowed size")]
    ChunkTooLarge,
    #[error("insufficient storage")]
    StorageFull,
    #[error("upload incomplete: {} chunk(s) missing", missing.len())]
    Incomplete { missing: Vec<u32> },
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl From<Box<dyn std::error::Error + Send + Sync>> for UploadError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        UploadError::Internal(err)
    }
}

impl From<io::Error> for UploadError {
    fn from(err: io::Error) -> Self {
        UploadError::Internal(Box::new(err))
    }
}

/// Wire receipt for one accepted (or re-sent) chunk.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkReceipt {
    pub uploaded_chunks: u32,
    pub total_chunks: u32,
    pub progress: f64,
}

pub struct UploadCoordinator {
    store: Arc<dyn StateStore>,
    queue: Arc<dyn JobQueuePort>,
    bus: Arc<EventBus>,
    layout: StorageLayout,
    gc: Arc<GarbageCollector>,
}

impl UploadCoordinator {
    pub fn new(
        store: Arc<dyn StateStore>,
        queue: Arc<dyn JobQueuePort>,
        bus: Arc<EventBus>,
        layout: StorageLayout,
        gc: Arc<GarbageCollector>,
    ) -> Self {
        Self {
            store,
            queue,
            bus,
            layout,
            gc,
        }
    }

    pub async fn create_session(
        &self,
        filename: &str,
        total_size: u64,
        mime_type: &str,
    ) -> Result<UploadSession, UploadError> {
        if filename.trim().is_empty() {
            return Err(UploadError::Validation("filename is required".into()));
        }
        if total_size == 0 {
            return Err(UploadError::Validation("totalSize must be positive".into()));
        }
        if total_size > MAX_UPLOAD_SIZE {
            return Err(UploadError::Validation(
                "totalSize exceeds the 10 GiB limit".into(),
            ));
        }

        let video = Video::new(filename, total_size, mime_type);
        let session = UploadSession::new(&video.id, filename, total_size, CHUNK_SIZE);
        info!(video = %video.id, session = %session.id, chunks = session.total_chunks, "upload session created");
        self.store.create_video(video).await?;
        self.store.create_session(session.clone()).await?;
        Ok(session)
    }

    pub async fn session(&self, id: &str) -> Result<Option<UploadSession>, UploadError> {
        Ok(self.store.get_session(id).await?)
    }

    /// Preflight for one chunk write: free-space floor with one synchronous
    /// GC attempt, then a fresh temp path next to the session directories.
    pub async fn prepare_chunk_write(&self) -> Result<std::path::PathBuf, UploadError> {
        if self.gc.needs_space() {
            self.gc.run().await;
            if self.gc.needs_space() {
                return Err(UploadError::StorageFull);
            }
        }
        tokio::fs::create_dir_all(self.layout.chunks_dir()).await?;
        Ok(self.layout.temp_chunk_file())
    }

    /// Classify a failed body write. A full disk gets a synchronous GC pass
    /// and surfaces as the retryable storage error.
    pub async fn chunk_write_failed(&self, temp: &Path, err: io::Error) -> UploadError {
        let _ = tokio::fs::remove_file(temp).await;
        if err.kind() == io::ErrorKind::StorageFull {
            warn!("chunk write hit a full disk; running GC");
            self.gc.run().await;
            UploadError::StorageFull
        } else {
            err.into()
        }
    }

    /// Promote a fully-written temp body to its final `chunk_<index>` path
    /// and record the index. The rename is atomic within the chunks
    /// filesystem, which is what makes wire-level retries idempotent.
    pub async fn ingest_chunk(
        &self,
        session_id: &str,
        index: u32,
        temp: &Path,
        size: u64,
    ) -> Result<ChunkReceipt, UploadError> {
        let outcome = self.validate_and_promote(session_id, index, temp, size).await;
        if outcome.is_err() {
            let _ = tokio::fs::remove_file(temp).await;
        }
        outcome
    }

    async fn validate_and_promote(
        &self,
        session_id: &str,
        index: u32,
        temp: &Path,
        size: u64,
    ) -> Result<ChunkReceipt, UploadError> {
        let Some(session) = self.store.get_session(session_id).await? else {
            return Err(UploadError::SessionNotFound);
        };
        if index >= session.total_chunks {
            return Err(UploadError::Validation(format!(
                "chunkIndex must be in [0, {})",
                session.total_chunks
            )));
        }
        if size == 0 {
            return Err(UploadError::Validation("chunk body is empty".into()));
        }
        if size > MAX_CHUNK_BODY {
            return Err(UploadError::ChunkTooLarge);
        }

        tokio::fs::create_dir_all(self.layout.session_dir(session_id)).await?;
        tokio::fs::rename(temp, self.layout.chunk_file(session_id, index)).await?;

        let session = self
            .store
            .mark_chunk_received(session_id, index)
            .await?
            .ok_or(UploadError::SessionNotFound)?;
        Ok(ChunkReceipt {
            uploaded_chunks: session.received_chunks.len() as u32,
            total_chunks: session.total_chunks,
            progress: session.progress(),
        })
    }

    /// Assemble the source file and fan out one job per resolution.
    /// Returns the video id. Re-completing an already completed session is
    /// the idempotent no-op.
    pub async fn complete(&self, session_id: &str) -> Result<String, UploadError> {
        let Some(session) = self.store.get_session(session_id).await? else {
            return Err(UploadError::SessionNotFound);
        };
        if session.status == SessionStatus::Completed {
            return Ok(session.video_id);
        }
        if !session.is_complete() {
            return Err(UploadError::Incomplete {
                missing: session.missing_chunks(MISSING_CHUNKS_CAP),
            });
        }

        let output = self
            .layout
            .upload_file(&session.video_id, &session.filename);
        tokio::fs::create_dir_all(self.layout.uploads_dir()).await?;
        if let Err(e) = self.assemble(&session, &output).await {
            let _ = tokio::fs::remove_file(&output).await;
            return Err(e.into());
        }
        info!(video = %session.video_id, "reassembled {} chunks", session.total_chunks);

        // The session is done with its chunks; the directory goes now
        // rather than waiting out the 24h expiry.
        if let Err(e) = tokio::fs::remove_dir_all(self.layout.session_dir(&session.id)).await {
            warn!(session = %session.id, "failed to remove chunk directory: {}", e);
        }
        self.store
            .set_session_status(&session.id, SessionStatus::Completed)
            .await?;
        self.store
            .update_video(
                &session.video_id,
                VideoUpdate {
                    status: Some(VideoStatus::UploadCompleted),
                    upload_progress: Some(100.0),
                    ..Default::default()
                },
            )
            .await?;
        self.bus.emit(VideoEvent::with_data(
            EventKind::UploadCompleted,
            &session.video_id,
            json!({ "filename": session.filename }),
        ));

        let mut jobs = Vec::with_capacity(Resolution::ALL.len());
        for resolution in Resolution::ALL {
            tokio::fs::create_dir_all(self.layout.resolution_dir(&session.video_id, resolution))
                .await?;
            let job = TranscodingJob::new(&session.video_id, resolution, output.clone());
            self.store.create_job(job.clone()).await?;
            self.store
                .update_video(
                    &session.video_id,
                    VideoUpdate {
                        transcoding_progress: Some((resolution, 0.0)),
                        ..Default::default()
                    },
                )
                .await?;
            jobs.push(job);
        }
        self.store
            .update_video(
                &session.video_id,
                VideoUpdate {
                    status: Some(VideoStatus::Queued),
                    ..Default::default()
                },
            )
            .await?;
        for job in &jobs {
            self.queue.enqueue(QueuedJob::from_job(job)).await?;
        }
        info!(video = %session.video_id, "queued 3 transcoding jobs");

        Ok(session.video_id)
    }

    /// Sequential streamed copy of chunks 0..totalChunks into the output.
    /// `tokio::io::copy` awaits on a full write buffer, which pauses the
    /// chunk read until the writer drains.
    async fn assemble(&self, session: &UploadSession, output: &Path) -> io::Result<()> {
        let file = File::create(output).await?;
        let mut writer = BufWriter::new(file);
        for index in 0..session.total_chunks {
            let mut chunk = File::open(self.layout.chunk_file(&session.id, index)).await?;
            tokio::io::copy(&mut chunk, &mut writer).await?;
        }
        writer.flush().await?;
        Ok(())
    }

    /// Remove the transcoded tree and uploaded source, then the state.
    pub async fn delete_video(&self, id: &str) -> Result<(), UploadError> {
        let Some(video) = self.store.delete_video(id).await? else {
            return Err(UploadError::VideoNotFound);
        };
        let _ = tokio::fs::remove_dir_all(self.layout.video_transcoded_dir(id)).await;
        let _ = tokio::fs::remove_file(self.layout.upload_file(id, &video.filename)).await;
        info!(video = %id, "deleted");
        Ok(())
    }
}
