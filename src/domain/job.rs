use super::video::Resolution;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// One unit of transcoding work: one video at one target resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodingJob {
    pub id: String,
    pub video_id: String,
    pub resolution: Resolution,
    pub status: JobStatus,
    pub progress: f64,
    pub input_path: PathBuf,
    /// Playback URL of the generated playlist, present once Completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl TranscodingJob {
    pub fn new(video_id: impl Into<String>, resolution: Resolution, input_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            video_id: video_id.into(),
            resolution,
            status: JobStatus::Pending,
            progress: 0.0,
            input_path,
            output_path: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// The queue-transport representation of a job. Small and serializable so
/// the brokered and in-process queues carry the same payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedJob {
    pub job_id: String,
    pub video_id: String,
    pub resolution: Resolution,
    pub input_path: PathBuf,
}

impl QueuedJob {
    pub fn from_job(job: &TranscodingJob) -> Self {
        Self {
            job_id: job.id.clone(),
            video_id: job.video_id.clone(),
            resolution: job.resolution,
            input_path: job.input_path.clone(),
        }
    }
}

/// Job counts by status, as reported by GET /queue/stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Narrow update descriptor for a job record.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<f64>,
    pub output_path: Option<String>,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    pub fn apply(self, job: &mut TranscodingJob) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(path) = self.output_path {
            job.output_path = Some(path);
        }
        if let Some(message) = self.error_message {
            job.error_message = Some(message);
        }
        if let Some(at) = self.started_at {
            job.started_at = Some(at);
        }
        if let Some(at) = self.completed_at {
            job.completed_at = Some(at);
        }
    }
}
