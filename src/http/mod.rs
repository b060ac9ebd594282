//! HTTP surface: route dispatch, multipart intake, streaming reads and the
//! live client gateway.

pub mod error;
pub mod stats;
pub mod stream;
pub mod upload;
pub mod videos;
pub mod ws;

use crate::application::UploadCoordinator;
use crate::events::EventHub;
use crate::ports::repository::StateStore;
use crate::storage::{GarbageCollector, StorageLayout};
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Request body ceiling: the 10 MiB chunk cap plus multipart framing
/// headroom.
const BODY_LIMIT: usize = 12 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub coordinator: Arc<UploadCoordinator>,
    pub gc: Arc<GarbageCollector>,
    pub hub: Arc<EventHub>,
    pub layout: StorageLayout,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload/session", post(upload::create_session))
        .route("/upload/session/:id", get(upload::get_session))
        .route("/upload/chunk", post(upload::upload_chunk))
        .route("/upload/complete", post(upload::complete))
        .route("/videos", get(videos::list))
        .route("/videos/:id", get(videos::get).delete(videos::delete))
        .route("/queue/stats", get(stats::queue_stats))
        .route("/storage/cleanup", post(stats::cleanup))
        .route("/storage/stats", get(stats::storage_stats))
        .route("/stream/:id/:resolution/:file", get(stream::serve))
        .route("/ws", get(ws::upgrade))
        .layer(cors)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state)
}
