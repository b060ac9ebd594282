use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Target output shape for one transcoding job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Low,
    Medium,
    High,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::Low, Resolution::Medium, Resolution::High];

    /// Output dimensions (width, height).
    pub fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Low => (640, 360),
            Resolution::Medium => (1280, 720),
            Resolution::High => (1920, 1080),
        }
    }

    /// Target video bitrate in kbps. Max rate is the same; buffer is 2x.
    pub fn bitrate_kbps(self) -> u32 {
        match self {
            Resolution::Low => 800,
            Resolution::Medium => 2500,
            Resolution::High => 5000,
        }
    }

    /// Queue priority - lower runs first, so low resolution streams are
    /// playable soonest.
    pub fn priority(self) -> u8 {
        match self {
            Resolution::Low => 1,
            Resolution::Medium => 2,
            Resolution::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Low => "low",
            Resolution::Medium => "medium",
            Resolution::High => "high",
        }
    }
}

impl std::str::FromStr for Resolution {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Resolution::Low),
            "medium" => Ok(Resolution::Medium),
            "high" => Ok(Resolution::High),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoStatus {
    Uploading,
    UploadCompleted,
    Queued,
    Transcoding,
    Completed,
    Failed,
}

/// A single uploaded video and its transcoding lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub filename: String,
    pub size: u64,
    pub mime_type: String,
    pub status: VideoStatus,
    pub upload_progress: f64,
    pub transcoding_progress: HashMap<Resolution, f64>,
    pub hls_urls: HashMap<Resolution, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Video {
    pub fn new(filename: impl Into<String>, size: u64, mime_type: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            filename: filename.into(),
            size,
            mime_type: mime_type.into(),
            status: VideoStatus::Uploading,
            upload_progress: 0.0,
            transcoding_progress: HashMap::new(),
            hls_urls: HashMap::new(),
            error_message: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// True once every resolution has reported 100 percent.
    pub fn all_resolutions_done(&self) -> bool {
        Resolution::ALL.iter().all(|r| {
            self.transcoding_progress
                .get(r)
                .is_some_and(|p| *p >= 100.0)
        })
    }
}

/// Narrow update descriptor - only the fields that may change. Applied
/// read-modify-write inside the state store's critical section.
#[derive(Debug, Clone, Default)]
pub struct VideoUpdate {
    pub status: Option<VideoStatus>,
    pub upload_progress: Option<f64>,
    pub transcoding_progress: Option<(Resolution, f64)>,
    pub hls_url: Option<(Resolution, String)>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl VideoUpdate {
    pub fn apply(self, video: &mut Video) {
        if let Some(status) = self.status {
            video.status = status;
        }
        if let Some(progress) = self.upload_progress {
            video.upload_progress = progress;
        }
        if let Some((resolution, progress)) = self.transcoding_progress {
            video.transcoding_progress.insert(resolution, progress);
        }
        if let Some((resolution, url)) = self.hls_url {
            video.hls_urls.insert(resolution, url);
        }
        if let Some(message) = self.error_message {
            video.error_message = Some(message);
        }
        if let Some(at) = self.completed_at {
            video.completed_at = Some(at);
        }
    }
}
