//! Queue and storage introspection endpoints.

use super::error::ApiError;
use super::AppState;
use crate::domain::QueueStats;
use crate::storage::StorageStats;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStatsResponse {
    #[serde(flatten)]
    stats: StorageStats,
    active_sessions: usize,
}

pub async fn queue_stats(State(state): State<AppState>) -> Result<Json<QueueStats>, ApiError> {
    Ok(Json(state.store.queue_stats().await?))
}

pub async fn cleanup(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let cleaned = state.gc.run().await;
    let storage = state.gc.storage_stats().await;
    Ok(Json(json!({ "cleaned": cleaned, "storage": storage })))
}

pub async fn storage_stats(
    State(state): State<AppState>,
) -> Result<Json<StorageStatsResponse>, ApiError> {
    Ok(Json(StorageStatsResponse {
        stats: state.gc.storage_stats().await,
        active_sessions: state.store.count_active_sessions().await?,
    }))
}
