use crate::types::FlowEvent;

/// Event bus using tokio broadcast channel.
/// All subscribers receive all events.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<FlowEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: FlowEvent) {
        // Ignore error if no receivers
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<FlowEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RunId;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(FlowEvent::RunPaused {
            run_id: RunId::from_str("r1"),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, FlowEvent::RunPaused { .. }));
    }

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new(4);
        bus.publish(FlowEvent::RunReset {
            run_id: RunId::new(),
        });
    }
}
