use super::hub::EventHub;
use crate::adapters::redis::RedisPublisher;
use crate::domain::VideoEvent;
use std::sync::Arc;
use tracing::{debug, warn};

/// Two sinks per emit, both best-effort: synchronous local dispatch, and a
/// fire-and-forget JSON publish to the broker. A missing broker never blocks
/// or fails emission.
pub struct EventBus {
    hub: Arc<EventHub>,
    broker: Option<RedisPublisher>,
}

impl EventBus {
    pub fn new(hub: Arc<EventHub>, broker: Option<RedisPublisher>) -> Self {
        Self { hub, broker }
    }

    pub fn emit(&self, event: VideoEvent) {
        if let Some(broker) = &self.broker {
            let broker = broker.clone();
            let event = event.clone();
            tokio::spawn(async move {
                if let Err(e) = broker.publish(&event).await {
                    warn!("broker publish failed: {}", e);
                }
            });
        }

        // A send error only means no live subscriber; not worth more than a
        // debug line.
        if let Err(e) = self.hub.publish(event) {
            debug!("no local subscribers for event: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventKind;

    #[tokio::test]
    async fn emit_without_broker_reaches_local_subscribers() {
        let hub = Arc::new(EventHub::new());
        let mut rx = hub.subscribe();
        let bus = EventBus::new(hub, None);

        bus.emit(VideoEvent::new(EventKind::UploadCompleted, "vid"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, EventKind::UploadCompleted);
        assert_eq!(received.video_id, "vid");
    }

    #[tokio::test]
    async fn emit_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(Arc::new(EventHub::new()), None);
        bus.emit(VideoEvent::new(EventKind::TranscodingFailed, "vid"));
    }
}
