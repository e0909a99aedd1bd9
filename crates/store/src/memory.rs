use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    AggregateId, AggregateRecord, EventEnvelope, EventId, RecordQuery, Result, StoreError,
    Version,
    store::{AggregateStore, StoreTransaction},
};

type RecordKey = (String, AggregateId);

#[derive(Debug, Clone)]
struct OutboxEntry {
    envelope: EventEnvelope,
    dispatched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct State {
    records: HashMap<RecordKey, AggregateRecord>,
    outbox: Vec<OutboxEntry>,
}

impl State {
    fn committed_version(&self, key: &RecordKey) -> Version {
        self.records
            .get(key)
            .map(|r| r.version)
            .unwrap_or_else(Version::initial)
    }
}

/// In-memory aggregate store.
///
/// Transactions stage their writes locally and validate, at commit time,
/// that every record they touched is still at the version they first saw.
/// Provides the same conflict behavior as the PostgreSQL store without a
/// database, which makes it the default for tests.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_count(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Returns every outbox entry not yet pruned, dispatched or not.
    pub async fn outbox(&self) -> Vec<EventEnvelope> {
        self.state
            .read()
            .await
            .outbox
            .iter()
            .map(|e| e.envelope.clone())
            .collect()
    }
}

fn matching(records: impl Iterator<Item = AggregateRecord>, query: &RecordQuery) -> Vec<AggregateRecord> {
    let mut found: Vec<_> = records
        .filter(|r| r.aggregate_type == query.aggregate_type && r.has_term(&query.index_term))
        .collect();
    found.sort_by_key(|r| r.aggregate_id);
    if let Some(limit) = query.limit {
        found.truncate(limit);
    }
    found
}

#[async_trait]
impl AggregateStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            state: Arc::clone(&self.state),
            seen: HashMap::new(),
            staged: HashMap::new(),
            outbox: Vec::new(),
            open: true,
        }))
    }

    async fn load(&self, aggregate_type: &str, id: AggregateId) -> Result<Option<AggregateRecord>> {
        let state = self.state.read().await;
        Ok(state.records.get(&(aggregate_type.to_string(), id)).cloned())
    }

    async fn find(&self, query: &RecordQuery) -> Result<Vec<AggregateRecord>> {
        let state = self.state.read().await;
        Ok(matching(state.records.values().cloned(), query))
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<EventEnvelope>> {
        let state = self.state.read().await;
        Ok(state
            .outbox
            .iter()
            .filter(|e| e.dispatched_at.is_none())
            .take(limit)
            .map(|e| e.envelope.clone())
            .collect())
    }

    async fn mark_dispatched(&self, event_ids: &[EventId]) -> Result<()> {
        let now = Utc::now();
        let mut state = self.state.write().await;
        for entry in state.outbox.iter_mut() {
            if entry.dispatched_at.is_none() && event_ids.contains(&entry.envelope.event_id) {
                entry.dispatched_at = Some(now);
            }
        }
        Ok(())
    }

    async fn prune_dispatched(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.outbox.len();
        state
            .outbox
            .retain(|e| e.dispatched_at.is_none_or(|at| at >= cutoff));
        Ok(before - state.outbox.len())
    }
}

#[derive(Debug, Clone)]
enum Staged {
    Put(AggregateRecord),
    Delete,
}

/// A unit of work over [`InMemoryStore`].
pub struct InMemoryTransaction {
    state: Arc<RwLock<State>>,
    /// Committed version of each touched record at the moment it was first touched.
    seen: HashMap<RecordKey, Version>,
    staged: HashMap<RecordKey, Staged>,
    outbox: Vec<EventEnvelope>,
    open: bool,
}

impl InMemoryTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed)
        }
    }

    async fn touch(&mut self, key: &RecordKey) {
        if !self.seen.contains_key(key) {
            let version = self.state.read().await.committed_version(key);
            self.seen.insert(key.clone(), version);
        }
    }

    /// The version of `key` as this transaction currently sees it.
    fn current_version(&self, key: &RecordKey) -> Version {
        match self.staged.get(key) {
            Some(Staged::Put(record)) => record.version,
            Some(Staged::Delete) => Version::initial(),
            None => self.seen.get(key).copied().unwrap_or_else(Version::initial),
        }
    }

    fn check_version(&self, key: &RecordKey, expected: Version) -> Result<()> {
        let actual = self.current_version(key);
        if actual != expected {
            metrics::counter!("store_conflicts_total").increment(1);
            return Err(StoreError::ConcurrencyConflict {
                aggregate_type: key.0.clone(),
                aggregate_id: key.1,
                expected,
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn load(
        &mut self,
        aggregate_type: &str,
        id: AggregateId,
    ) -> Result<Option<AggregateRecord>> {
        self.ensure_open()?;
        let key = (aggregate_type.to_string(), id);
        match self.staged.get(&key) {
            Some(Staged::Put(record)) => return Ok(Some(record.clone())),
            Some(Staged::Delete) => return Ok(None),
            None => {}
        }

        let record = self.state.read().await.records.get(&key).cloned();
        self.seen
            .entry(key)
            .or_insert_with(|| record.as_ref().map(|r| r.version).unwrap_or_default());
        Ok(record)
    }

    async fn find(&mut self, query: &RecordQuery) -> Result<Vec<AggregateRecord>> {
        self.ensure_open()?;
        let mut merged: HashMap<RecordKey, AggregateRecord> = {
            let state = self.state.read().await;
            state
                .records
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        for (key, staged) in &self.staged {
            match staged {
                Staged::Put(record) => {
                    merged.insert(key.clone(), record.clone());
                }
                Staged::Delete => {
                    merged.remove(key);
                }
            }
        }
        Ok(matching(merged.into_values(), query))
    }

    async fn save(&mut self, mut record: AggregateRecord) -> Result<Version> {
        self.ensure_open()?;
        let key = (record.aggregate_type.clone(), record.aggregate_id);
        self.touch(&key).await;
        self.check_version(&key, record.version)?;

        let new_version = record.version.next();
        record.version = new_version;
        record.updated_at = Utc::now();
        self.staged.insert(key, Staged::Put(record));
        Ok(new_version)
    }

    async fn delete(
        &mut self,
        aggregate_type: &str,
        id: AggregateId,
        expected: Version,
    ) -> Result<()> {
        self.ensure_open()?;
        let key = (aggregate_type.to_string(), id);
        self.touch(&key).await;
        self.check_version(&key, expected)?;
        self.staged.insert(key, Staged::Delete);
        Ok(())
    }

    async fn append_outbox(&mut self, events: Vec<EventEnvelope>) -> Result<()> {
        self.ensure_open()?;
        self.outbox.extend(events);
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.write().await;

        for (key, expected) in &self.seen {
            let actual = state.committed_version(key);
            if actual != *expected {
                metrics::counter!("store_conflicts_total").increment(1);
                return Err(StoreError::ConcurrencyConflict {
                    aggregate_type: key.0.clone(),
                    aggregate_id: key.1,
                    expected: *expected,
                    actual,
                });
            }
        }

        for (key, staged) in self.staged.drain() {
            match staged {
                Staged::Put(record) => {
                    state.records.insert(key, record);
                }
                Staged::Delete => {
                    state.records.remove(&key);
                }
            }
        }
        state
            .outbox
            .extend(self.outbox.drain(..).map(|envelope| OutboxEntry {
                envelope,
                dispatched_at: None,
            }));

        self.open = false;
        tracing::debug!(records = self.seen.len(), "in-memory transaction committed");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.outbox.clear();
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: AggregateId, version: Version, stock: u32) -> AggregateRecord {
        AggregateRecord::from_state(
            id,
            "Product",
            version,
            &serde_json::json!({ "stock": stock }),
            vec!["sku:WIDGET".to_string()],
        )
        .unwrap()
    }

    fn envelope(id: AggregateId, event_type: &str) -> EventEnvelope {
        EventEnvelope::builder()
            .event_type(event_type)
            .aggregate_id(id)
            .aggregate_type("Product")
            .version(Version::first())
            .payload_raw(serde_json::json!({}))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();

        let mut tx = store.begin().await.unwrap();
        let version = tx.save(record(id, Version::initial(), 10)).await.unwrap();
        assert_eq!(version, Version::first());
        assert!(store.load("Product", id).await.unwrap().is_none());

        tx.commit().await.unwrap();
        let loaded = store.load("Product", id).await.unwrap().unwrap();
        assert_eq!(loaded.version, Version::first());
        assert_eq!(loaded.state["stock"], 10);
    }

    #[tokio::test]
    async fn transaction_reads_its_own_writes() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();

        let mut tx = store.begin().await.unwrap();
        tx.save(record(id, Version::initial(), 4)).await.unwrap();
        let staged = tx.load("Product", id).await.unwrap().unwrap();
        assert_eq!(staged.version, Version::first());

        let found = tx
            .find(&RecordQuery::new("Product", "sku:WIDGET"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn rollback_discards_everything() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();

        let mut tx = store.begin().await.unwrap();
        tx.save(record(id, Version::initial(), 10)).await.unwrap();
        tx.append_outbox(vec![envelope(id, "ProductCreated")])
            .await
            .unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(store.record_count().await, 0);
        assert!(store.outbox().await.is_empty());
        assert!(matches!(
            tx.commit().await,
            Err(StoreError::TransactionClosed)
        ));
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.save(record(AggregateId::new(), Version::initial(), 1))
                .await
                .unwrap();
        }
        assert_eq!(store.record_count().await, 0);
    }

    #[tokio::test]
    async fn stale_save_is_rejected_immediately() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();
        let mut tx = store.begin().await.unwrap();
        tx.save(record(id, Version::initial(), 10)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let err = tx
            .save(record(id, Version::initial(), 10))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn concurrent_writers_conflict_at_commit() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();
        let mut setup = store.begin().await.unwrap();
        setup.save(record(id, Version::initial(), 10)).await.unwrap();
        setup.commit().await.unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        let a = first.load("Product", id).await.unwrap().unwrap();
        let b = second.load("Product", id).await.unwrap().unwrap();

        first.save(record(id, a.version, 4)).await.unwrap();
        second.save(record(id, b.version, 4)).await.unwrap();

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict { expected, actual, .. }
                if expected == Version::first() && actual == Version::new(2)
        ));

        let stored = store.load("Product", id).await.unwrap().unwrap();
        assert_eq!(stored.version, Version::new(2));
    }

    #[tokio::test]
    async fn delete_removes_record_on_commit() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();
        let mut tx = store.begin().await.unwrap();
        tx.save(record(id, Version::initial(), 0)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.delete("Product", id, Version::first()).await.unwrap();
        assert!(tx.load("Product", id).await.unwrap().is_none());
        tx.commit().await.unwrap();

        assert!(store.load("Product", id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn outbox_keeps_order_and_tracks_dispatch() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();
        let first = envelope(id, "StockReduced");
        let second = envelope(id, "LowStock");

        let mut tx = store.begin().await.unwrap();
        tx.append_outbox(vec![first.clone(), second.clone()])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending, vec![first.clone(), second.clone()]);

        store.mark_dispatched(&[first.event_id]).await.unwrap();
        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending, vec![second]);
    }

    #[tokio::test]
    async fn pruning_drops_only_old_dispatched_entries() {
        let store = InMemoryStore::new();
        let id = AggregateId::new();
        let sent = envelope(id, "StockReduced");
        let waiting = envelope(id, "LowStock");

        let mut tx = store.begin().await.unwrap();
        tx.append_outbox(vec![sent.clone(), waiting.clone()])
            .await
            .unwrap();
        tx.commit().await.unwrap();
        store.mark_dispatched(&[sent.event_id]).await.unwrap();

        let earlier = Utc::now() - chrono::TimeDelta::hours(1);
        assert_eq!(store.prune_dispatched(earlier).await.unwrap(), 0);
        assert_eq!(store.outbox().await.len(), 2);

        let later = Utc::now() + chrono::TimeDelta::seconds(1);
        assert_eq!(store.prune_dispatched(later).await.unwrap(), 1);
        assert_eq!(store.outbox().await, vec![waiting.clone()]);
        assert_eq!(store.pending_outbox(10).await.unwrap(), vec![waiting]);
    }
}
