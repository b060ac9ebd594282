//! API error type: the only mapping from service errors to wire status
//! codes. Validation detail goes to the client; internal detail only to the
//! server log.

use crate::application::UploadError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("chunk exceeds the allowed size")]
    PayloadTooLarge,
    #[error("insufficient storage")]
    StorageFull,
    #[error("upload incomplete")]
    Incomplete { missing: Vec<u32> },
    #[error("internal server error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, json!({ "error": message }))
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, json!({ "error": message })),
            ApiError::PayloadTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({ "error": self.to_string() }),
            ),
            ApiError::StorageFull => (
                StatusCode::INSUFFICIENT_STORAGE,
                json!({ "error": self.to_string(), "retryable": true }),
            ),
            ApiError::Incomplete { missing } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "upload incomplete", "missingChunks": missing }),
            ),
            ApiError::Internal(source) => {
                error!("internal error: {}", source);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<UploadError> for ApiError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Validation(message) => ApiError::BadRequest(message),
            UploadError::SessionNotFound => ApiError::NotFound("upload session not found".into()),
            UploadError::VideoNotFound => ApiError::NotFound("video not found".into()),
            UploadError::ChunkTooLarge => ApiError::PayloadTooLarge,
            UploadError::StorageFull => ApiError::StorageFull,
            UploadError::Incomplete { missing } => ApiError::Incomplete { missing },
            UploadError::Internal(source) => ApiError::Internal(source),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for ApiError {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        ApiError::Internal(err)
    }
}
