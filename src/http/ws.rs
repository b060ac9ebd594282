//! Live client gateway: a bidirectional socket carrying subscribe /
//! unsubscribe upstream and scoped event fan-out downstream.
//!
//! Clients are responsible for resubscribing after a reconnect.

use super::AppState;
use crate::domain::VideoEvent;
use crate::events::EventHub;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<EventHub>) {
    let (mut sink, mut stream) = socket.split();
    let mut events = hub.subscribe();
    let mut subscriptions: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => handle_command(&text, &mut subscriptions),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {} // ping/pong and binary frames are ignored
                    Some(Err(e)) => {
                        debug!("websocket receive error: {}", e);
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if deliver(&mut sink, &event, &subscriptions).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "slow websocket client dropped events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }
    debug!("websocket client disconnected");
}

fn handle_command(text: &str, subscriptions: &mut HashSet<String>) {
    let mut parts = text.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("subscribe"), Some(video_id)) => {
            subscriptions.insert(video_id.to_string());
        }
        (Some("unsubscribe"), Some(video_id)) => {
            subscriptions.remove(video_id);
        }
        _ => debug!("ignoring unknown socket command: {}", text),
    }
}

/// Every event reaches every socket on the global stream; sockets subscribed
/// to the event's video additionally get the scoped message.
async fn deliver(
    sink: &mut (impl Sink<Message, Error = axum::Error> + Unpin),
    event: &VideoEvent,
    subscriptions: &HashSet<String>,
) -> Result<(), axum::Error> {
    if subscriptions.contains(&event.video_id) {
        sink.send(Message::Text(envelope("video-event", event))).await?;
    }
    sink.send(Message::Text(envelope("global-event", event))).await
}

fn envelope(message_type: &str, event: &VideoEvent) -> String {
    json!({ "type": message_type, "payload": event }).to_string()
}
