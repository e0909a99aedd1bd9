//! Event sink trait and implementations.

use std::sync::Arc;

use async_trait::async_trait;
use store::EventEnvelope;
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Event sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for committed events. One call per event, in raised order.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError>;
}

#[derive(Debug, Default)]
struct InMemorySinkState {
    published: Vec<EventEnvelope>,
    fail_on_publish: bool,
    /// Publishes to accept before failing, when set.
    fail_after: Option<usize>,
}

/// Sink that records every published event.
#[derive(Debug, Clone, Default)]
pub struct InMemoryEventSink {
    state: Arc<RwLock<InMemorySinkState>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the sink to reject every publish.
    pub async fn set_fail_on_publish(&self, fail: bool) {
        let mut state = self.state.write().await;
        state.fail_on_publish = fail;
        state.fail_after = None;
    }

    /// Accepts `count` more events, then rejects until reset.
    pub async fn fail_after(&self, count: usize) {
        self.state.write().await.fail_after = Some(count);
    }

    pub async fn published(&self) -> Vec<EventEnvelope> {
        self.state.read().await.published.clone()
    }

    pub async fn published_types(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .published
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub async fn clear(&self) {
        self.state.write().await.published.clear();
    }
}

#[async_trait]
impl EventSink for InMemoryEventSink {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError> {
        let mut state = self.state.write().await;
        if state.fail_on_publish {
            return Err(PublishError::Unavailable("sink disabled".to_string()));
        }
        if let Some(remaining) = state.fail_after.as_mut() {
            if *remaining == 0 {
                return Err(PublishError::Unavailable("sink disabled".to_string()));
            }
            *remaining -= 1;
        }
        state.published.push(event.clone());
        Ok(())
    }
}

/// Fans events out to in-process subscribers over a broadcast channel.
///
/// Publishing never waits for subscribers. Events sent while nobody is
/// subscribed are dropped.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    sender: broadcast::Sender<EventEnvelope>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl EventSink for BroadcastEventSink {
    async fn publish(&self, event: &EventEnvelope) -> Result<(), PublishError> {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                tracing::trace!(event_type = %event.event_type, receivers, "Event broadcast");
            }
            Err(_) => {
                tracing::debug!(event_type = %event.event_type, "No subscribers for event");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use common::AggregateId;
    use store::Version;

    use super::*;

    fn envelope(event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Order")
            .event_type(event_type)
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn in_memory_sink_records_and_fails_on_demand() {
        let sink = InMemoryEventSink::new();
        sink.publish(&envelope("A")).await.unwrap();

        sink.fail_after(1).await;
        sink.publish(&envelope("B")).await.unwrap();
        assert!(sink.publish(&envelope("C")).await.is_err());

        sink.set_fail_on_publish(false).await;
        sink.publish(&envelope("D")).await.unwrap();
        assert_eq!(sink.published_types().await, vec!["A", "B", "D"]);
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers() {
        let sink = BroadcastEventSink::new(16);
        sink.publish(&envelope("Unheard")).await.unwrap();

        let mut rx = sink.subscribe();
        sink.publish(&envelope("Heard")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().event_type, "Heard");
    }
}
