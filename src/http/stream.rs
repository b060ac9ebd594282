//! Streaming file server for the transcoded tree. No range support; a
//! standards-compliant whole-file response is sufficient for HLS clients.

use super::error::ApiError;
use super::AppState;
use crate::domain::Resolution;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

const PLAYLIST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";

pub async fn serve(
    State(state): State<AppState>,
    Path((video_id, resolution, file)): Path<(String, String, String)>,
) -> Result<Response, ApiError> {
    let resolution: Resolution = resolution
        .parse()
        .map_err(|_| ApiError::NotFound("unknown resolution".into()))?;

    // Only the two generated shapes are served; anything else (including
    // traversal attempts) is simply absent.
    let content_type = match file.rsplit('.').next() {
        Some("m3u8") => PLAYLIST_CONTENT_TYPE,
        Some("ts") => SEGMENT_CONTENT_TYPE,
        _ => return Err(not_found()),
    };
    if file.contains("..") || file.contains('/') || file.contains('\\') {
        return Err(not_found());
    }

    let path = state.layout.segment_path(&video_id, resolution, &file);
    let handle = File::open(&path).await.map_err(|_| not_found())?;
    let length = handle.metadata().await.map_err(|_| not_found())?.len();

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(ReaderStream::new(handle)))
        .map_err(|e| ApiError::Internal(Box::new(e)))
}

fn not_found() -> ApiError {
    ApiError::NotFound("file not found".into())
}
