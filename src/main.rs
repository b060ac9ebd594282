//! Server binary - single-node deployment.
//!
//! Wires up:
//! - In-memory state store and the on-disk storage layout
//! - Redis-backed queue and broker sink when REDIS_URL answers, otherwise
//!   the in-process queue (degraded local mode)
//! - Worker pool, garbage collector, event bus
//! - HTTP surface with the live client gateway

use caruso::adapters::redis::RedisJobQueue;
use caruso::encoder::FfmpegTranscoder;
use caruso::http::{self, AppState};
use caruso::ports::queue::JobQueuePort;
use caruso::{
    Config, EventBus, EventHub, GarbageCollector, LocalJobQueue, MemoryStore, RedisPool,
    RedisPublisher, StorageLayout, UploadCoordinator, WorkerPool,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let layout = StorageLayout::new(&config.storage_dir);
    layout
        .ensure_dirs()
        .await
        .expect("failed to create storage directories");

    let store = Arc::new(MemoryStore::new());

    // 1. Queue transport + broker sink. A broker that does not answer at
    // startup selects local mode; behavior stays identical for clients.
    let (queue, publisher): (Arc<dyn JobQueuePort>, Option<RedisPublisher>) =
        match &config.redis_url {
            Some(url) => match RedisPool::connect(url).await {
                Ok(pool) => {
                    info!("using Redis queue and broker at {}", url);
                    (
                        Arc::new(RedisJobQueue::new(pool.clone())),
                        Some(RedisPublisher::new(pool)),
                    )
                }
                Err(e) => {
                    warn!("Redis unreachable ({}); falling back to in-process queue", e);
                    (Arc::new(LocalJobQueue::new()), None)
                }
            },
            None => {
                info!("no REDIS_URL configured; using in-process queue");
                (Arc::new(LocalJobQueue::new()), None)
            }
        };

    // 2. Event fan-out
    let hub = Arc::new(EventHub::new());
    let bus = Arc::new(EventBus::new(hub.clone(), publisher));

    // 3. Garbage collector (first pass runs immediately)
    let gc = Arc::new(GarbageCollector::new(layout.clone(), store.clone()));
    gc.clone().start();

    // 4. Worker pool
    let pool = Arc::new(WorkerPool::new(
        store.clone(),
        queue.clone(),
        bus.clone(),
        Arc::new(FfmpegTranscoder::new()),
        layout.clone(),
    ));
    pool.start();

    // 5. Upload coordinator + HTTP surface
    let coordinator = Arc::new(UploadCoordinator::new(
        store.clone(),
        queue,
        bus,
        layout.clone(),
        gc.clone(),
    ));
    let app = http::router(AppState {
        store,
        coordinator,
        gc,
        hub,
        layout,
    });

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", config.addr, config.port))
        .await
        .expect("Failed to bind TCP listener");
    info!("Listening at {}:{}", config.addr, config.port);
    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
