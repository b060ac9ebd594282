//! In-memory StateStore reference implementation.
//!
//! Three maps, one mutex per record type. Critical sections never await, so
//! plain std mutexes are enough; lock order is sessions/jobs before videos
//! for the two operations that span record types.

use crate::domain::{
    JobStatus, JobUpdate, QueueStats, SessionStatus, TranscodingJob, UploadSession, Video,
    VideoStatus, VideoUpdate,
};
use crate::ports::repository::{StateStore, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Default)]
pub struct MemoryStore {
    videos: Mutex<HashMap<String, Video>>,
    sessions: Mutex<HashMap<String, UploadSession>>,
    jobs: Mutex<HashMap<String, TranscodingJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn create_video(&self, video: Video) -> StoreResult<()> {
        self.videos.lock().unwrap().insert(video.id.clone(), video);
        Ok(())
    }

    async fn get_video(&self, id: &str) -> StoreResult<Option<Video>> {
        Ok(self.videos.lock().unwrap().get(id).cloned())
    }

    async fn list_videos(&self) -> StoreResult<Vec<Video>> {
        let mut videos: Vec<Video> = self.videos.lock().unwrap().values().cloned().collect();
        videos.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(videos)
    }

    async fn update_video(&self, id: &str, update: VideoUpdate) -> StoreResult<Option<Video>> {
        let mut videos = self.videos.lock().unwrap();
        match videos.get_mut(id) {
            Some(video) => {
                update.apply(video);
                Ok(Some(video.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete_video(&self, id: &str) -> StoreResult<Option<Video>> {
        let mut jobs = self.jobs.lock().unwrap();
        let removed = self.videos.lock().unwrap().remove(id);
        if removed.is_some() {
            jobs.retain(|_, job| job.video_id != id);
        }
        Ok(removed)
    }

    async fn create_session(&self, session: UploadSession) -> StoreResult<()> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, id: &str) -> StoreResult<Option<UploadSession>> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn set_session_status(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> StoreResult<Option<UploadSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(id) {
            Some(session) => {
                session.status = status;
                Ok(Some(session.clone()))
            }
            None => Ok(None),
        }
    }

    async fn mark_chunk_received(
        &self,
        session_id: &str,
        index: u32,
    ) -> StoreResult<Option<UploadSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get_mut(session_id) else {
            return Ok(None);
        };
        session.received_chunks.insert(index);
        let progress = session.progress();

        // Upload percent moves with the session, in the same critical
        // section, so readers never see the two disagree.
        let mut videos = self.videos.lock().unwrap();
        if let Some(video) = videos.get_mut(&session.video_id) {
            video.upload_progress = progress;
        }

        Ok(Some(session.clone()))
    }

    async fn expire_overdue_sessions(&self, now: DateTime<Utc>) -> StoreResult<Vec<UploadSession>> {
        let mut sessions = self.sessions.lock().unwrap();
        let mut expired = Vec::new();
        for session in sessions.values_mut() {
            if session.status == SessionStatus::Active && session.is_expired_at(now) {
                session.status = SessionStatus::Expired;
                expired.push(session.clone());
            }
        }
        Ok(expired)
    }

    async fn count_active_sessions(&self) -> StoreResult<usize> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status == SessionStatus::Active)
            .count())
    }

    async fn create_job(&self, job: TranscodingJob) -> StoreResult<()> {
        self.jobs.lock().unwrap().insert(job.id.clone(), job);
        Ok(())
    }

    async fn get_job(&self, id: &str) -> StoreResult<Option<TranscodingJob>> {
        Ok(self.jobs.lock().unwrap().get(id).cloned())
    }

    async fn jobs_for_video(&self, video_id: &str) -> StoreResult<Vec<TranscodingJob>> {
        let mut jobs: Vec<TranscodingJob> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.video_id == video_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.resolution.priority());
        Ok(jobs)
    }

    async fn update_job(&self, id: &str, update: JobUpdate) -> StoreResult<Option<TranscodingJob>> {
        let mut jobs = self.jobs.lock().unwrap();
        match jobs.get_mut(id) {
            Some(job) => {
                update.apply(job);
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete_job_resolution(
        &self,
        job_id: &str,
        playlist_url: &str,
    ) -> StoreResult<Option<Video>> {
        let mut jobs = self.jobs.lock().unwrap();
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(None);
        };
        job.status = JobStatus::Completed;
        job.progress = 100.0;
        job.output_path = Some(playlist_url.to_string());
        job.completed_at = Some(Utc::now());
        let video_id = job.video_id.clone();
        let resolution = job.resolution;

        // Jobs lock stays held: the all-three-complete check must see a
        // consistent job/video pair.
        let mut videos = self.videos.lock().unwrap();
        let Some(video) = videos.get_mut(&video_id) else {
            return Ok(None);
        };
        video.hls_urls.insert(resolution, playlist_url.to_string());
        video.transcoding_progress.insert(resolution, 100.0);
        if video.all_resolutions_done() {
            video.status = VideoStatus::Completed;
            video.completed_at = Some(Utc::now());
        }
        Ok(Some(video.clone()))
    }

    async fn queue_stats(&self) -> StoreResult<QueueStats> {
        let jobs = self.jobs.lock().unwrap();
        let mut stats = QueueStats::default();
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.waiting += 1,
                JobStatus::Processing => stats.active += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Resolution;
    use chrono::Duration;
    use std::path::PathBuf;

    async fn seed_video(store: &MemoryStore) -> Video {
        let video = Video::new("clip.mp4", 5_000_000, "video/mp4");
        store.create_video(video.clone()).await.unwrap();
        video
    }

    #[tokio::test]
    async fn mark_chunk_received_is_idempotent_and_moves_upload_percent() {
        let store = MemoryStore::new();
        let video = seed_video(&store).await;
        let session = UploadSession::new(&video.id, "clip.mp4", 5_000_000, 2_097_152);
        store.create_session(session.clone()).await.unwrap();

        let updated = store
            .mark_chunk_received(&session.id, 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.received_chunks.len(), 1);

        let again = store
            .mark_chunk_received(&session.id, 2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.received_chunks.len(), 1);

        let video = store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(video.upload_progress, 33.33);
    }

    #[tokio::test]
    async fn mark_chunk_received_unknown_session_is_absent() {
        let store = MemoryStore::new();
        assert!(store.mark_chunk_received("nope", 0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn video_completes_only_when_all_three_resolutions_do() {
        let store = MemoryStore::new();
        let video = seed_video(&store).await;

        let mut job_ids = Vec::new();
        for resolution in Resolution::ALL {
            let job = TranscodingJob::new(&video.id, resolution, PathBuf::from("in.mp4"));
            job_ids.push(job.id.clone());
            store.create_job(job).await.unwrap();
        }

        for (i, job_id) in job_ids.iter().enumerate() {
            let url = format!("/stream/{}/x/playlist.m3u8", video.id);
            let after = store
                .complete_job_resolution(job_id, &url)
                .await
                .unwrap()
                .unwrap();
            if i < 2 {
                assert_ne!(after.status, VideoStatus::Completed);
                assert!(after.completed_at.is_none());
            } else {
                assert_eq!(after.status, VideoStatus::Completed);
                assert!(after.completed_at.is_some());
            }
        }

        let video = store.get_video(&video.id).await.unwrap().unwrap();
        assert_eq!(video.hls_urls.len(), 3);
    }

    #[tokio::test]
    async fn complete_resolution_for_deleted_video_is_a_no_op() {
        let store = MemoryStore::new();
        let video = seed_video(&store).await;
        let job = TranscodingJob::new(&video.id, Resolution::Low, PathBuf::from("in.mp4"));
        let job_id = job.id.clone();
        store.create_job(job).await.unwrap();

        store.delete_video(&video.id).await.unwrap();
        // The job went with the video, so the write lands nowhere.
        assert!(store
            .complete_job_resolution(&job_id, "/stream/x/low/playlist.m3u8")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn delete_video_removes_its_jobs() {
        let store = MemoryStore::new();
        let video = seed_video(&store).await;
        for resolution in Resolution::ALL {
            store
                .create_job(TranscodingJob::new(
                    &video.id,
                    resolution,
                    PathBuf::from("in.mp4"),
                ))
                .await
                .unwrap();
        }

        assert!(store.delete_video(&video.id).await.unwrap().is_some());
        assert!(store.jobs_for_video(&video.id).await.unwrap().is_empty());
        assert!(store.delete_video(&video.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expire_overdue_sessions_flips_only_overdue_actives() {
        let store = MemoryStore::new();
        let video = seed_video(&store).await;
        let fresh = UploadSession::new(&video.id, "a.mp4", 1024, 2_097_152);
        let mut stale = UploadSession::new(&video.id, "b.mp4", 1024, 2_097_152);
        stale.expires_at = Utc::now() - Duration::hours(1);
        let stale_id = stale.id.clone();
        store.create_session(fresh.clone()).await.unwrap();
        store.create_session(stale).await.unwrap();

        let expired = store.expire_overdue_sessions(Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, stale_id);
        assert_eq!(store.count_active_sessions().await.unwrap(), 1);

        // Second pass finds nothing new.
        assert!(store
            .expire_overdue_sessions(Utc::now())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn list_videos_is_newest_first() {
        let store = MemoryStore::new();
        let mut older = Video::new("old.mp4", 1, "video/mp4");
        older.created_at = Utc::now() - Duration::minutes(5);
        let newer = Video::new("new.mp4", 1, "video/mp4");
        store.create_video(older.clone()).await.unwrap();
        store.create_video(newer.clone()).await.unwrap();

        let listed = store.list_videos().await.unwrap();
        assert_eq!(listed[0].id, newer.id);
        assert_eq!(listed[1].id, older.id);
    }

    #[tokio::test]
    async fn queue_stats_counts_by_status() {
        let store = MemoryStore::new();
        let video = seed_video(&store).await;
        let pending = TranscodingJob::new(&video.id, Resolution::Low, PathBuf::from("in.mp4"));
        let mut failed = TranscodingJob::new(&video.id, Resolution::High, PathBuf::from("in.mp4"));
        failed.status = JobStatus::Failed;
        store.create_job(pending).await.unwrap();
        store.create_job(failed).await.unwrap();

        let stats = store.queue_stats().await.unwrap();
        assert_eq!(stats.waiting, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.active, 0);
        assert_eq!(stats.completed, 0);
    }
}
