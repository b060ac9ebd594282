//! Video listing, lookup and deletion.

use super::error::ApiError;
use super::AppState;
use crate::domain::Video;
use axum::extract::{Path, State};
use axum::Json;
use serde_json::{json, Value};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Video>>, ApiError> {
    Ok(Json(state.store.list_videos().await?))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Video>, ApiError> {
    match state.store.get_video(&id).await? {
        Some(video) => Ok(Json(video)),
        None => Err(ApiError::NotFound("video not found".into())),
    }
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.coordinator.delete_video(&id).await?;
    Ok(Json(json!({ "success": true })))
}
