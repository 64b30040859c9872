//! Best-effort domain event publishing over NATS, mirrored to in-process subscribers.

use tokio::sync::broadcast;

use crate::domain::events::DomainEvent;

const LOCAL_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
    local: broadcast::Sender<DomainEvent>,
}

impl Default for EventPublisher {
    fn default() -> Self { Self::new(None) }
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self {
        let (local, _) = broadcast::channel(LOCAL_CAPACITY);
        Self { nats, local }
    }

    pub fn disabled() -> Self { Self::default() }

    pub fn is_enabled(&self) -> bool { self.nats.is_some() }

    /// Receive every event published from now on. A receiver that falls more than
    /// `LOCAL_CAPACITY` events behind skips the oldest.
    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> { self.local.subscribe() }

    /// Publish every event on its subject. Failures are logged and dropped.
    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in &events {
            // No receivers is the normal case.
            let _ = self.local.send(event.clone());
        }

        let Some(client) = &self.nats else {
            for event in &events {
                tracing::debug!(subject = event.subject(), "event not published (NATS disabled)");
            }
            return;
        };
        for event in events {
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(subject = event.subject(), "event serialisation failed: {e}");
                    continue;
                }
            };
            if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
                tracing::warn!(subject = event.subject(), "event publish failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::ProductStatus;
    use crate::domain::events::ProductEvent;

    #[tokio::test]
    async fn subscribers_see_events_without_nats() {
        let publisher = EventPublisher::disabled();
        let mut rx = publisher.subscribe();
        let event = DomainEvent::Product(ProductEvent::StatusChanged { product_id: 3, status: ProductStatus::Sold });

        publisher.publish_all(vec![event.clone()]).await;
        assert_eq!(rx.try_recv().unwrap(), event);
        assert!(rx.try_recv().is_err());
    }
}
