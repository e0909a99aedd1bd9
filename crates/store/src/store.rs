use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AggregateId, AggregateRecord, EventEnvelope, EventId, RecordQuery, Result, Version};

/// A durable store of aggregate records that supports atomic multi-aggregate commits.
///
/// All mutation goes through a [`StoreTransaction`]. The non-transactional
/// reads here serve the query path and the outbox relay.
#[async_trait]
pub trait AggregateStore: Send + Sync {
    /// Opens a new unit of work against the store.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Reads the latest committed record.
    async fn load(&self, aggregate_type: &str, id: AggregateId) -> Result<Option<AggregateRecord>>;

    async fn find(&self, query: &RecordQuery) -> Result<Vec<AggregateRecord>>;

    /// Returns committed outbox entries that have not been dispatched yet, oldest first.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<EventEnvelope>>;

    async fn mark_dispatched(&self, event_ids: &[EventId]) -> Result<()>;

    /// Deletes entries dispatched before `cutoff`. Pending entries are never
    /// touched. Returns how many were removed.
    async fn prune_dispatched(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// An open unit of work.
///
/// Reads observe the transaction's own staged writes. Nothing becomes visible
/// to other transactions until [`commit`](StoreTransaction::commit) succeeds;
/// dropping an uncommitted transaction discards everything it staged.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn load(
        &mut self,
        aggregate_type: &str,
        id: AggregateId,
    ) -> Result<Option<AggregateRecord>>;

    async fn find(&mut self, query: &RecordQuery) -> Result<Vec<AggregateRecord>>;

    /// Writes `record`, which must carry the version it was read at
    /// ([`Version::initial`] for a new aggregate). Returns the new version.
    async fn save(&mut self, record: AggregateRecord) -> Result<Version>;

    async fn delete(&mut self, aggregate_type: &str, id: AggregateId, expected: Version)
    -> Result<()>;

    /// Stages events for the outbox; they become pending when the transaction commits.
    async fn append_outbox(&mut self, events: Vec<EventEnvelope>) -> Result<()>;

    async fn commit(&mut self) -> Result<()>;

    async fn rollback(&mut self) -> Result<()>;
}
