//! Directory discipline under the configured storage root.
//!
//! - `chunks/<sessionId>/chunk_<index>` - received chunks, written atomically
//! - `chunks/temp_<uuid>` - transient multipart bodies before promotion
//! - `uploads/<videoId><ext>` - assembled source files
//! - `transcoded/<videoId>/<resolution>/` - encoder output trees

use crate::domain::Resolution;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: PathBuf,
}

impl StorageLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn chunks_dir(&self) -> PathBuf {
        self.root.join("chunks")
    }

    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.chunks_dir().join(session_id)
    }

    pub fn chunk_file(&self, session_id: &str, index: u32) -> PathBuf {
        self.session_dir(session_id).join(format!("chunk_{}", index))
    }

    /// Fresh temp path for an in-flight multipart body. Lives directly in
    /// the chunks directory so the promoting rename stays on one filesystem.
    pub fn temp_chunk_file(&self) -> PathBuf {
        self.chunks_dir().join(format!("temp_{}", Uuid::new_v4()))
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    /// Assembled source path, preserving the original extension.
    pub fn upload_file(&self, video_id: &str, filename: &str) -> PathBuf {
        self.uploads_dir()
            .join(format!("{}{}", video_id, file_extension(filename)))
    }

    pub fn transcoded_dir(&self) -> PathBuf {
        self.root.join("transcoded")
    }

    pub fn video_transcoded_dir(&self, video_id: &str) -> PathBuf {
        self.transcoded_dir().join(video_id)
    }

    pub fn resolution_dir(&self, video_id: &str, resolution: Resolution) -> PathBuf {
        self.video_transcoded_dir(video_id)
            .join(resolution.as_str())
    }

    pub fn playlist_path(&self, video_id: &str, resolution: Resolution) -> PathBuf {
        self.resolution_dir(video_id, resolution).join("playlist.m3u8")
    }

    pub fn segment_path(&self, video_id: &str, resolution: Resolution, segment: &str) -> PathBuf {
        self.resolution_dir(video_id, resolution).join(segment)
    }

    /// The playback URL clients hold; a stable external contract.
    pub fn playlist_url(video_id: &str, resolution: Resolution) -> String {
        format!("/stream/{}/{}/playlist.m3u8", video_id, resolution)
    }

    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(self.chunks_dir()).await?;
        tokio::fs::create_dir_all(self.uploads_dir()).await?;
        tokio::fs::create_dir_all(self.transcoded_dir()).await?;
        Ok(())
    }

    /// Free bytes on the filesystem holding the storage root.
    pub fn available_space(&self) -> io::Result<u64> {
        fs2::available_space(&self.root)
    }
}

/// Extension including the leading dot, or empty when the filename has none.
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_follow_the_layout_contract() {
        let layout = StorageLayout::new("/srv/storage");
        assert_eq!(
            layout.chunk_file("sess", 7),
            PathBuf::from("/srv/storage/chunks/sess/chunk_7")
        );
        assert_eq!(
            layout.upload_file("vid", "movie.mp4"),
            PathBuf::from("/srv/storage/uploads/vid.mp4")
        );
        assert_eq!(
            layout.playlist_path("vid", Resolution::Medium),
            PathBuf::from("/srv/storage/transcoded/vid/medium/playlist.m3u8")
        );
    }

    #[test]
    fn temp_paths_live_beside_session_dirs() {
        let layout = StorageLayout::new("/srv/storage");
        let temp = layout.temp_chunk_file();
        assert_eq!(temp.parent().unwrap(), layout.chunks_dir());
        assert!(temp
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("temp_"));
    }

    #[test]
    fn extension_is_preserved_or_empty() {
        assert_eq!(file_extension("clip.mp4"), ".mp4");
        assert_eq!(file_extension("archive.tar.gz"), ".gz");
        assert_eq!(file_extension("noext"), "");
    }

    #[test]
    fn playlist_url_is_the_streaming_route() {
        assert_eq!(
            StorageLayout::playlist_url("vid", Resolution::High),
            "/stream/vid/high/playlist.m3u8"
        );
    }
}
