//! Background reclamation of temp files, expired session directories and
//! orphaned output trees.
//!
//! GC is the only expiry-driven deleter of chunk directories. It skips
//! sessions that are still Active, so it can never race a live assembly.

use super::layout::StorageLayout;
use crate::ports::repository::StateStore;
use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// GC runs at process start and on this cadence thereafter.
pub const GC_INTERVAL: Duration = Duration::from_secs(5 * 60);
/// Aborted multipart leftovers older than this are deleted.
pub const TEMP_TTL: Duration = Duration::from_secs(5 * 60);
/// Chunk directories with no matching session are deleted past this age.
pub const ORPHAN_SESSION_TTL: Duration = Duration::from_secs(30 * 60);
/// Below this free-space floor, chunk intake triggers a synchronous pass.
pub const MIN_FREE_BYTES: u64 = 100 * 1024 * 1024;

/// On-disk usage snapshot for the storage endpoints.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct StorageStats {
    #[serde(rename = "chunksMB")]
    pub chunks_mb: f64,
    #[serde(rename = "uploadsMB")]
    pub uploads_mb: f64,
    #[serde(rename = "transcodedMB")]
    pub transcoded_mb: f64,
    #[serde(rename = "tempFiles")]
    pub temp_files: usize,
}

pub struct GarbageCollector {
    layout: StorageLayout,
    store: Arc<dyn StateStore>,
}

impl GarbageCollector {
    pub fn new(layout: StorageLayout, store: Arc<dyn StateStore>) -> Self {
        Self { layout, store }
    }

    /// Spawn the periodic loop. The first tick fires immediately.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(GC_INTERVAL);
            loop {
                ticker.tick().await;
                let cleaned = self.run().await;
                if cleaned > 0 {
                    info!(cleaned, "storage GC pass finished");
                }
            }
        })
    }

    /// One full pass. Returns the number of filesystem entries removed.
    /// Per-entry failures are logged and skipped; a pass never errors out.
    pub async fn run(&self) -> u64 {
        let now = Utc::now();
        if let Err(e) = self.store.expire_overdue_sessions(now).await {
            warn!("failed to expire overdue sessions: {}", e);
        }

        let mut cleaned = 0;
        cleaned += self.sweep_chunks().await;
        cleaned += self.sweep_orphaned_outputs().await;
        cleaned
    }

    async fn sweep_chunks(&self) -> u64 {
        let chunks_dir = self.layout.chunks_dir();
        let mut cleaned = 0;
        let mut entries = match tokio::fs::read_dir(&chunks_dir).await {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();

            if name.starts_with("temp_") {
                if is_older_than(&path, TEMP_TTL).await {
                    debug!(path = %path.display(), "removing stale temp file");
                    if remove_entry(&path).await {
                        cleaned += 1;
                    }
                }
                continue;
            }

            if !path.is_dir() {
                continue;
            }

            match self.store.get_session(&name).await {
                Ok(Some(session)) => {
                    // Active sessions are untouchable; anything else waits
                    // out its declared expiry before the directory goes.
                    let reclaimable = session.status
                        != crate::domain::SessionStatus::Active
                        && session.is_expired_at(Utc::now());
                    if reclaimable {
                        debug!(session = %name, "removing expired session chunks");
                        if remove_entry(&path).await {
                            cleaned += 1;
                        }
                    }
                }
                Ok(None) => {
                    if is_older_than(&path, ORPHAN_SESSION_TTL).await {
                        debug!(session = %name, "removing orphaned session chunks");
                        if remove_entry(&path).await {
                            cleaned += 1;
                        }
                    }
                }
                Err(e) => warn!(session = %name, "session lookup failed during GC: {}", e),
            }
        }
        cleaned
    }

    /// Output trees and uploaded sources for videos that no longer exist
    /// (deleted mid-transcode) are reclaimed here.
    async fn sweep_orphaned_outputs(&self) -> u64 {
        let mut cleaned = 0;

        if let Ok(mut entries) = tokio::fs::read_dir(self.layout.transcoded_dir()).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let video_id = entry.file_name().to_string_lossy().into_owned();
                if matches!(self.store.get_video(&video_id).await, Ok(None))
                    && remove_entry(&entry.path()).await
                {
                    debug!(video = %video_id, "removed orphaned transcoded tree");
                    cleaned += 1;
                }
            }
        }

        if let Ok(mut entries) = tokio::fs::read_dir(self.layout.uploads_dir()).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name().to_string_lossy().into_owned();
                let video_id = name.split('.').next().unwrap_or(&name).to_string();
                if matches!(self.store.get_video(&video_id).await, Ok(None))
                    && remove_entry(&entry.path()).await
                {
                    debug!(video = %video_id, "removed orphaned upload");
                    cleaned += 1;
                }
            }
        }

        cleaned
    }

    /// Whether chunk intake should run a synchronous pass first.
    pub fn needs_space(&self) -> bool {
        match self.layout.available_space() {
            Ok(free) => free < MIN_FREE_BYTES,
            Err(e) => {
                warn!("free-space estimate failed: {}", e);
                false
            }
        }
    }

    pub async fn storage_stats(&self) -> StorageStats {
        StorageStats {
            chunks_mb: to_mb(dir_size(self.layout.chunks_dir()).await),
            uploads_mb: to_mb(dir_size(self.layout.uploads_dir()).await),
            transcoded_mb: to_mb(dir_size(self.layout.transcoded_dir()).await),
            temp_files: count_temp_files(self.layout.chunks_dir()).await,
        }
    }
}

fn to_mb(bytes: u64) -> f64 {
    (bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0
}

async fn is_older_than(path: &Path, ttl: Duration) -> bool {
    match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
        Ok(modified) => is_stale(modified, ttl, SystemTime::now()),
        Err(_) => false,
    }
}

fn is_stale(modified: SystemTime, ttl: Duration, now: SystemTime) -> bool {
    now.duration_since(modified)
        .map(|age| age > ttl)
        .unwrap_or(false)
}

async fn remove_entry(path: &Path) -> bool {
    let result = if path.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    if let Err(e) = &result {
        warn!(path = %path.display(), "GC failed to remove entry: {}", e);
    }
    result.is_ok()
}

async fn count_temp_files(dir: PathBuf) -> usize {
    let mut count = 0;
    if let Ok(mut entries) = tokio::fs::read_dir(dir).await {
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with("temp_") {
                count += 1;
            }
        }
    }
    count
}

/// Recursive directory size without following symlinks.
async fn dir_size(dir: PathBuf) -> u64 {
    let mut total = 0;
    let mut stack = vec![dir];
    while let Some(current) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&current).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                if let Ok(meta) = entry.metadata().await {
                    total += meta.len();
                }
            }
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{SessionStatus, UploadSession, Video};
    use crate::ports::repository::StateStore;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    async fn fixture() -> (tempfile::TempDir, StorageLayout, Arc<MemoryStore>) {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::new(dir.path());
        layout.ensure_dirs().await.unwrap();
        (dir, layout, Arc::new(MemoryStore::new()))
    }

    #[test]
    fn staleness_compares_age_against_ttl() {
        let now = SystemTime::now();
        let ttl = Duration::from_secs(300);
        assert!(is_stale(now - Duration::from_secs(301), ttl, now));
        assert!(!is_stale(now - Duration::from_secs(299), ttl, now));
        // Clock skew (mtime in the future) must not delete anything.
        assert!(!is_stale(now + Duration::from_secs(10), ttl, now));
    }

    #[tokio::test]
    async fn active_session_directories_survive() {
        let (_dir, layout, store) = fixture().await;
        let session = UploadSession::new("vid", "clip.mp4", 1024, 2_097_152);
        let session_dir = layout.session_dir(&session.id);
        tokio::fs::create_dir_all(&session_dir).await.unwrap();
        store.create_session(session).await.unwrap();

        let gc = GarbageCollector::new(layout, store);
        gc.run().await;
        assert!(session_dir.exists());
    }

    #[tokio::test]
    async fn expired_session_directories_are_reclaimed() {
        let (_dir, layout, store) = fixture().await;
        let mut session = UploadSession::new("vid", "clip.mp4", 1024, 2_097_152);
        session.expires_at = Utc::now() - ChronoDuration::hours(1);
        let session_dir = layout.session_dir(&session.id);
        tokio::fs::create_dir_all(&session_dir).await.unwrap();
        tokio::fs::write(session_dir.join("chunk_0"), b"data")
            .await
            .unwrap();
        let session_id = session.id.clone();
        store.create_session(session).await.unwrap();

        let gc = GarbageCollector::new(layout, store.clone());
        let cleaned = gc.run().await;

        assert_eq!(cleaned, 1);
        assert!(!session_dir.exists());
        let session = store.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Expired);
    }

    #[tokio::test]
    async fn unknown_but_fresh_directories_survive() {
        let (_dir, layout, store) = fixture().await;
        let stray = layout.session_dir("no-such-session");
        tokio::fs::create_dir_all(&stray).await.unwrap();

        let gc = GarbageCollector::new(layout, store);
        gc.run().await;
        // Under the 30 minute orphan TTL, so it stays.
        assert!(stray.exists());
    }

    #[tokio::test]
    async fn orphaned_output_trees_are_reclaimed() {
        let (_dir, layout, store) = fixture().await;
        let known = Video::new("kept.mp4", 1, "video/mp4");
        store.create_video(known.clone()).await.unwrap();

        let kept = layout.video_transcoded_dir(&known.id);
        let orphan = layout.video_transcoded_dir("gone");
        tokio::fs::create_dir_all(kept.join("low")).await.unwrap();
        tokio::fs::create_dir_all(orphan.join("low")).await.unwrap();
        tokio::fs::write(layout.upload_file("gone", "x.mp4"), b"src")
            .await
            .unwrap();

        let gc = GarbageCollector::new(layout.clone(), store);
        let cleaned = gc.run().await;

        assert_eq!(cleaned, 2);
        assert!(kept.exists());
        assert!(!orphan.exists());
        assert!(!layout.upload_file("gone", "x.mp4").exists());
    }

    #[tokio::test]
    async fn fresh_temp_files_survive() {
        let (_dir, layout, store) = fixture().await;
        let temp = layout.temp_chunk_file();
        tokio::fs::write(&temp, b"partial").await.unwrap();

        let gc = GarbageCollector::new(layout.clone(), store);
        gc.run().await;
        assert!(temp.exists());

        let stats = gc.storage_stats().await;
        assert_eq!(stats.temp_files, 1);
    }

    #[tokio::test]
    async fn storage_stats_measure_each_tree() {
        let (_dir, layout, store) = fixture().await;
        tokio::fs::write(layout.uploads_dir().join("v.mp4"), vec![0u8; 1024 * 1024])
            .await
            .unwrap();
        // Keep the upload's owner alive so GC-independent stats are exact.
        let gc = GarbageCollector::new(layout, store);
        let stats = gc.storage_stats().await;
        assert!(stats.uploads_mb > 0.0);
        assert_eq!(stats.chunks_mb, 0.0);
        assert_eq!(stats.temp_files, 0);
    }
}
