//! Publishes committed events from the outbox to the event sink.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use store::{AggregateStore, EventEnvelope, EventId};
use tracing::{debug, error, warn};

use crate::sink::EventSink;

/// Pass-through from the outbox to an [`EventSink`].
///
/// Events are published one at a time in the order given. The first failure
/// stops the batch so later events are never delivered ahead of an earlier
/// one; whatever was not marked dispatched is picked up by
/// [`redeliver_pending`](Self::redeliver_pending). Delivery is at least once.
#[derive(Clone)]
pub struct EventRelay {
    store: Arc<dyn AggregateStore>,
    sink: Arc<dyn EventSink>,
}

impl EventRelay {
    pub fn new(store: Arc<dyn AggregateStore>, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    /// Publishes events that were just committed. Never fails: the commit
    /// already happened, so problems are logged and left to redelivery.
    pub async fn publish_committed(&self, events: &[EventEnvelope]) -> usize {
        let published = self.publish_in_order(events).await;
        self.mark(&published).await;
        published.len()
    }

    /// Publishes up to `batch` pending outbox entries, oldest first.
    pub async fn redeliver_pending(&self, batch: usize) -> store::Result<usize> {
        let pending = self.store.pending_outbox(batch).await?;
        if pending.is_empty() {
            return Ok(0);
        }
        debug!(pending = pending.len(), "Redelivering outbox entries");
        let published = self.publish_in_order(&pending).await;
        self.store.mark_dispatched(&published).await?;
        metrics::counter!("events_redelivered_total").increment(published.len() as u64);
        Ok(published.len())
    }

    /// Deletes outbox entries dispatched more than `retention` ago.
    pub async fn prune_dispatched(&self, retention: Duration) -> store::Result<usize> {
        let Some(cutoff) = TimeDelta::from_std(retention)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return Ok(0);
        };
        let pruned = self.store.prune_dispatched(cutoff).await?;
        if pruned > 0 {
            debug!(pruned, "Pruned dispatched outbox entries");
            metrics::counter!("outbox_pruned_total").increment(pruned as u64);
        }
        Ok(pruned)
    }

    async fn publish_in_order(&self, events: &[EventEnvelope]) -> Vec<EventId> {
        let mut published = Vec::with_capacity(events.len());
        for (index, event) in events.iter().enumerate() {
            match self.sink.publish(event).await {
                Ok(()) => {
                    metrics::counter!("events_published_total", "event_type" => event.event_type.clone())
                        .increment(1);
                    published.push(event.event_id);
                }
                Err(e) => {
                    metrics::counter!("events_publish_failures_total").increment(1);
                    error!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        aggregate_id = %event.aggregate_id,
                        remaining = events.len() - index,
                        error = %e,
                        "Failed to publish event; leaving remainder for redelivery"
                    );
                    break;
                }
            }
        }
        published
    }

    async fn mark(&self, event_ids: &[EventId]) {
        if event_ids.is_empty() {
            return;
        }
        if let Err(e) = self.store.mark_dispatched(event_ids).await {
            warn!(error = %e, count = event_ids.len(), "Failed to mark events dispatched; they will be redelivered");
        }
    }
}

#[cfg(test)]
mod tests {
    use common::AggregateId;
    use store::{InMemoryStore, Version};

    use super::*;
    use crate::sink::InMemoryEventSink;

    fn envelope(event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .aggregate_id(AggregateId::new())
            .aggregate_type("Product")
            .event_type(event_type)
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    async fn committed(store: &InMemoryStore, events: Vec<EventEnvelope>) {
        let mut tx = store.begin().await.unwrap();
        tx.append_outbox(events).await.unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn failure_stops_the_batch_and_redelivery_resumes_in_order() {
        let store = InMemoryStore::new();
        let sink = InMemoryEventSink::new();
        let relay = EventRelay::new(Arc::new(store.clone()), Arc::new(sink.clone()));

        let events = vec![envelope("A"), envelope("B"), envelope("C")];
        committed(&store, events.clone()).await;

        sink.fail_after(1).await;
        assert_eq!(relay.publish_committed(&events).await, 1);
        assert_eq!(store.pending_outbox(10).await.unwrap().len(), 2);

        sink.set_fail_on_publish(false).await;
        assert_eq!(relay.redeliver_pending(10).await.unwrap(), 2);
        assert_eq!(sink.published_types().await, vec!["A", "B", "C"]);
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pruning_keeps_recent_and_pending_entries() {
        let store = InMemoryStore::new();
        let sink = InMemoryEventSink::new();
        let relay = EventRelay::new(Arc::new(store.clone()), Arc::new(sink.clone()));

        let events = vec![envelope("A"), envelope("B")];
        committed(&store, events.clone()).await;
        sink.fail_after(1).await;
        relay.publish_committed(&events).await;

        assert_eq!(relay.prune_dispatched(Duration::from_secs(3600)).await.unwrap(), 0);
        assert_eq!(store.outbox().await.len(), 2);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(relay.prune_dispatched(Duration::ZERO).await.unwrap(), 1);
        let left = store.outbox().await;
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].event_type, "B");
        assert_eq!(relay.prune_dispatched(Duration::MAX).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn redelivery_with_nothing_pending_is_a_noop() {
        let store = InMemoryStore::new();
        let sink = InMemoryEventSink::new();
        let relay = EventRelay::new(Arc::new(store), Arc::new(sink.clone()));

        assert_eq!(relay.redeliver_pending(10).await.unwrap(), 0);
        assert!(sink.published().await.is_empty());
    }
}
