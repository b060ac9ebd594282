use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    UploadCompleted,
    TranscodingStarted,
    TranscodingProgress,
    TranscodingCompleted,
    TranscodingFailed,
}

/// A phase transition on a specific video, as published to local subscribers
/// and the external broker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub video_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl VideoEvent {
    pub fn new(kind: EventKind, video_id: impl Into<String>) -> Self {
        Self {
            kind,
            video_id: video_id.into(),
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(kind: EventKind, video_id: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind,
            video_id: video_id.into(),
            data: Some(data),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_wire_shape() {
        let event = VideoEvent::with_data(
            EventKind::TranscodingProgress,
            "abc",
            json!({"resolution": "low", "progress": 40.0}),
        );
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "transcoding-progress");
        assert_eq!(value["videoId"], "abc");
        assert_eq!(value["data"]["resolution"], "low");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn data_is_omitted_when_absent() {
        let event = VideoEvent::new(EventKind::UploadCompleted, "abc");
        let value = serde_json::to_value(&event).unwrap();
        assert!(value.get("data").is_none());
    }
}
