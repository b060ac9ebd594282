use crate::domain::VideoEvent;
use tokio::sync::broadcast;

/// In-process pub/sub. Subscribers in the same process (the live client
/// gateway) receive events synchronously, in emission order per sender.
#[derive(Debug)]
pub struct EventHub {
    sender: broadcast::Sender<VideoEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        // Capacity of 100 events should be sufficient for now
        let (sender, _) = broadcast::channel(100);
        Self { sender }
    }

    pub fn publish(
        &self,
        event: VideoEvent,
    ) -> Result<usize, broadcast::error::SendError<VideoEvent>> {
        self.sender.send(event)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VideoEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventKind;

    #[tokio::test]
    async fn subscribers_receive_events_in_emission_order() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        hub.publish(VideoEvent::new(EventKind::TranscodingStarted, "a"))
            .unwrap();
        hub.publish(VideoEvent::new(EventKind::TranscodingProgress, "a"))
            .unwrap();
        hub.publish(VideoEvent::new(EventKind::TranscodingCompleted, "a"))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().kind, EventKind::TranscodingStarted);
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::TranscodingProgress);
        assert_eq!(
            rx.recv().await.unwrap().kind,
            EventKind::TranscodingCompleted
        );
    }

    #[test]
    fn publish_without_subscribers_reports_send_error() {
        let hub = EventHub::new();
        assert!(hub
            .publish(VideoEvent::new(EventKind::UploadCompleted, "a"))
            .is_err());
    }
}
