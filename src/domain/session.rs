use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Sessions expire 24h after creation; GC reclaims their chunk directories.
pub const SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    Active,
    Completed,
    Expired,
}

/// Server-side bookkeeping for a single in-progress chunked upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub id: String,
    pub video_id: String,
    pub filename: String,
    pub total_size: u64,
    pub chunk_size: u64,
    pub total_chunks: u32,
    /// Received chunk indices. A BTreeSet so the wire representation is a
    /// sorted array and membership updates stay idempotent.
    pub received_chunks: BTreeSet<u32>,
    pub status: SessionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UploadSession {
    pub fn new(
        video_id: impl Into<String>,
        filename: impl Into<String>,
        total_size: u64,
        chunk_size: u64,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            video_id: video_id.into(),
            filename: filename.into(),
            total_size,
            chunk_size,
            total_chunks: total_size.div_ceil(chunk_size) as u32,
            received_chunks: BTreeSet::new(),
            status: SessionStatus::Active,
            created_at,
            expires_at: created_at + Duration::hours(SESSION_TTL_HOURS),
        }
    }

    /// Sole precondition for assembly.
    pub fn is_complete(&self) -> bool {
        self.received_chunks.len() as u32 == self.total_chunks
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Upload percent, rounded to two decimals for the wire.
    pub fn progress(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        let raw = self.received_chunks.len() as f64 / self.total_chunks as f64 * 100.0;
        (raw * 100.0).round() / 100.0
    }

    /// Indices still outstanding, capped for readability in error bodies.
    pub fn missing_chunks(&self, cap: usize) -> Vec<u32> {
        (0..self.total_chunks)
            .filter(|i| !self.received_chunks.contains(i))
            .take(cap)
            .collect()
    }
}
