//! Upload coordinator endpoints: session create/get, chunk intake, complete.

use super::error::ApiError;
use super::AppState;
use crate::application::coordinator::{ChunkReceipt, MAX_CHUNK_BODY};
use crate::domain::UploadSession;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io;
use std::path::Path as FsPath;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub filename: String,
    pub total_size: u64,
    pub mime_type: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRequest {
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChunkResponse {
    success: bool,
    #[serde(flatten)]
    receipt: ChunkReceipt,
}

pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Json<UploadSession>, ApiError> {
    let session = state
        .coordinator
        .create_session(&body.filename, body.total_size, &body.mime_type)
        .await?;
    Ok(Json(session))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UploadSession>, ApiError> {
    match state.coordinator.session(&id).await? {
        Some(session) => Ok(Json(session)),
        None => Err(ApiError::NotFound("upload session not found".into())),
    }
}

/// Multipart chunk intake. The `sessionId` and `chunkIndex` fields must
/// precede the `chunk` file part so the body can be validated before it is
/// promoted.
pub async fn upload_chunk(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<ChunkResponse>, ApiError> {
    let mut session_id: Option<String> = None;
    let mut chunk_index: Option<u32> = None;
    let mut receipt: Option<ChunkReceipt> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("malformed multipart body: {}", e)))?
    {
        let name = field.name().map(ToString::to_string);
        match name.as_deref() {
            Some("sessionId") => {
                session_id = Some(field.text().await.map_err(bad_field)?);
            }
            Some("chunkIndex") => {
                let text = field.text().await.map_err(bad_field)?;
                chunk_index = Some(text.trim().parse().map_err(|_| {
                    ApiError::BadRequest("chunkIndex must be a non-negative integer".into())
                })?);
            }
            Some("chunk") => {
                let (Some(sid), Some(index)) = (session_id.as_deref(), chunk_index) else {
                    return Err(ApiError::BadRequest(
                        "sessionId and chunkIndex must precede the chunk part".into(),
                    ));
                };
                let temp = state.coordinator.prepare_chunk_write().await?;
                let size = match stream_field_to_file(field, &temp).await {
                    Ok(size) => size,
                    Err(StreamError::TooLarge) => {
                        let _ = tokio::fs::remove_file(&temp).await;
                        return Err(ApiError::PayloadTooLarge);
                    }
                    Err(StreamError::Body(message)) => {
                        let _ = tokio::fs::remove_file(&temp).await;
                        return Err(ApiError::BadRequest(message));
                    }
                    Err(StreamError::Io(e)) => {
                        return Err(state.coordinator.chunk_write_failed(&temp, e).await.into());
                    }
                };
                receipt = Some(state.coordinator.ingest_chunk(sid, index, &temp, size).await?);
            }
            _ => {}
        }
    }

    let receipt = receipt.ok_or_else(|| {
        ApiError::BadRequest("sessionId, chunkIndex and chunk fields are required".into())
    })?;
    Ok(Json(ChunkResponse {
        success: true,
        receipt,
    }))
}

pub async fn complete(
    State(state): State<AppState>,
    Json(body): Json<CompleteRequest>,
) -> Result<Json<Value>, ApiError> {
    let video_id = state.coordinator.complete(&body.session_id).await?;
    Ok(Json(json!({ "success": true, "videoId": video_id })))
}

fn bad_field(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::BadRequest(format!("unreadable multipart field: {}", err))
}

enum StreamError {
    TooLarge,
    Body(String),
    Io(io::Error),
}

/// Stream the file part to the temp path, enforcing the chunk body cap as
/// bytes arrive rather than after the fact.
async fn stream_field_to_file(mut field: Field<'_>, path: &FsPath) -> Result<u64, StreamError> {
    let file = File::create(path).await.map_err(StreamError::Io)?;
    let mut writer = BufWriter::new(file);
    let mut written: u64 = 0;

    loop {
        let chunk = match field.chunk().await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => return Err(StreamError::Body(format!("interrupted chunk body: {}", e))),
        };
        written += chunk.len() as u64;
        if written > MAX_CHUNK_BODY {
            return Err(StreamError::TooLarge);
        }
        writer.write_all(&chunk).await.map_err(StreamError::Io)?;
    }
    writer.flush().await.map_err(StreamError::Io)?;
    Ok(written)
}
