use crate::domain::{
    JobUpdate, QueueStats, SessionStatus, TranscodingJob, UploadSession, Video, VideoUpdate,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::error::Error;

pub type StoreResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// State store for video, upload-session and job records.
///
/// Every update is read-modify-write under mutual exclusion scoped to the
/// record type; mutations are visible to concurrent readers before the call
/// returns. The reference implementation is in-memory, but the contract is
/// written so a transactional database can replace it without touching
/// callers.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn create_video(&self, video: Video) -> StoreResult<()>;

    async fn get_video(&self, id: &str) -> StoreResult<Option<Video>>;

    /// All videos, newest first.
    async fn list_videos(&self) -> StoreResult<Vec<Video>>;

    /// Returns the updated record, or None for an unknown id (a tolerated
    /// no-op for workers racing a delete).
    async fn update_video(&self, id: &str, update: VideoUpdate) -> StoreResult<Option<Video>>;

    /// Removes the video and its jobs. Returns the removed record.
    async fn delete_video(&self, id: &str) -> StoreResult<Option<Video>>;

    async fn create_session(&self, session: UploadSession) -> StoreResult<()>;

    async fn get_session(&self, id: &str) -> StoreResult<Option<UploadSession>>;

    async fn set_session_status(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> StoreResult<Option<UploadSession>>;

    /// Idempotent: marking the same index twice is a no-op on state. Also
    /// recomputes the owning video's upload percent in the same critical
    /// section. Returns the updated session, or None if unknown.
    async fn mark_chunk_received(
        &self,
        session_id: &str,
        index: u32,
    ) -> StoreResult<Option<UploadSession>>;

    /// Flip Active sessions past their expiry to Expired, returning them.
    async fn expire_overdue_sessions(&self, now: DateTime<Utc>) -> StoreResult<Vec<UploadSession>>;

    async fn count_active_sessions(&self) -> StoreResult<usize>;

    async fn create_job(&self, job: TranscodingJob) -> StoreResult<()>;

    async fn get_job(&self, id: &str) -> StoreResult<Option<TranscodingJob>>;

    async fn jobs_for_video(&self, video_id: &str) -> StoreResult<Vec<TranscodingJob>>;

    async fn update_job(&self, id: &str, update: JobUpdate) -> StoreResult<Option<TranscodingJob>>;

    /// Terminal success for one resolution, in one critical section: the job
    /// becomes Completed at 100 with the playlist URL, the owning video gets
    /// the URL and per-resolution 100, and - if all three resolutions are
    /// now done - the video becomes Completed with a completion timestamp.
    async fn complete_job_resolution(
        &self,
        job_id: &str,
        playlist_url: &str,
    ) -> StoreResult<Option<Video>>;

    /// Job counts by status.
    async fn queue_stats(&self) -> StoreResult<QueueStats>;
}
