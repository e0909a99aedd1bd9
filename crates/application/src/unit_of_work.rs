//! One atomic, all-or-nothing sequence of loads, mutations and saves.

use chrono::{DateTime, Utc};
use common::{Actor, AggregateId};
use domain::{Aggregate, Customer, DomainEvent, Order, Product};
use read_cache::CacheKey;
use store::{AggregateRecord, EventEnvelope, RecordQuery, StoreTransaction};
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Read-cache entries whose content depends on an aggregate.
pub trait CacheDependent {
    fn cache_keys(&self) -> Vec<CacheKey>;
}

impl CacheDependent for Order {
    fn cache_keys(&self) -> Vec<CacheKey> {
        match self.id() {
            Some(id) => CacheKey::for_order(id, self.customer_id()),
            None => Vec::new(),
        }
    }
}

impl CacheDependent for Product {
    fn cache_keys(&self) -> Vec<CacheKey> {
        self.id().map(CacheKey::for_product).unwrap_or_default()
    }
}

impl CacheDependent for Customer {
    fn cache_keys(&self) -> Vec<CacheKey> {
        self.id().map(CacheKey::CustomerOrders).into_iter().collect()
    }
}

/// What a committed unit of work leaves behind for the relay and the invalidator.
#[derive(Debug, Default)]
pub struct Committed {
    /// Events in the order they were raised.
    pub events: Vec<EventEnvelope>,
    pub cache_keys: Vec<CacheKey>,
}

/// Wraps a store transaction for one command.
///
/// Aggregates are loaded by identity, changed through their command methods,
/// and saved back. Events are collected as they are raised and written to the
/// outbox in the same transaction at commit. Dropping a unit of work without
/// committing discards everything.
pub struct UnitOfWork {
    tx: Box<dyn StoreTransaction>,
    actor: Actor,
    correlation_id: Uuid,
    started_at: DateTime<Utc>,
    events: Vec<EventEnvelope>,
    cache_keys: Vec<CacheKey>,
    writes: usize,
}

impl UnitOfWork {
    pub fn new(tx: Box<dyn StoreTransaction>, actor: Actor) -> Self {
        Self {
            tx,
            actor,
            correlation_id: Uuid::new_v4(),
            started_at: Utc::now(),
            events: Vec::new(),
            cache_keys: Vec::new(),
            writes: 0,
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Events raised so far.
    pub fn events(&self) -> &[EventEnvelope] {
        &self.events
    }

    pub async fn load<A: Aggregate>(&mut self, id: AggregateId) -> Result<Option<A>> {
        match self.tx.load(A::aggregate_type(), id).await? {
            Some(record) => Ok(Some(hydrate(&record)?)),
            None => Ok(None),
        }
    }

    /// Loads an aggregate that must exist.
    pub async fn load_required<A: Aggregate>(&mut self, id: AggregateId) -> Result<A> {
        self.load(id)
            .await?
            .ok_or_else(|| AppError::not_found(A::aggregate_type(), id))
    }

    /// Aggregates carrying `term`, ordered by id.
    pub async fn find<A: Aggregate>(&mut self, term: impl Into<String>) -> Result<Vec<A>> {
        let query = RecordQuery::new(A::aggregate_type(), term);
        self.tx
            .find(&query)
            .await?
            .iter()
            .map(hydrate)
            .collect()
    }

    pub async fn count<A: Aggregate>(&mut self, term: impl Into<String>) -> Result<usize> {
        let query = RecordQuery::new(A::aggregate_type(), term);
        Ok(self.tx.find(&query).await?.len())
    }

    /// Applies events to the aggregate and records them for the outbox.
    pub fn apply<A: Aggregate>(&mut self, aggregate: &mut A, events: Vec<A::Event>) -> Result<()> {
        if events.is_empty() {
            return Ok(());
        }
        aggregate.apply_events(events.iter().cloned());
        for event in &events {
            let envelope = self.envelope(&*aggregate, event)?;
            self.events.push(envelope);
        }
        Ok(())
    }

    fn envelope<A: Aggregate>(&self, aggregate: &A, event: &A::Event) -> Result<EventEnvelope> {
        let mut builder = EventEnvelope::builder()
            .event_type(event.event_type())
            .aggregate_type(A::aggregate_type());
        if let Some(id) = aggregate.id() {
            builder = builder.aggregate_id(id);
        }
        Ok(builder
            .version(aggregate.version().next())
            .payload(event)?
            .metadata("actor", serde_json::json!(self.actor.as_str()))
            .metadata("correlation_id", serde_json::json!(self.correlation_id))
            .build()?)
    }

    /// Stamps and persists an aggregate, then updates its version.
    pub async fn save<A: Aggregate + CacheDependent>(&mut self, aggregate: &mut A) -> Result<()> {
        let id = aggregate
            .id()
            .ok_or_else(|| AppError::Validation(format!("{} has no identity", A::aggregate_type())))?;
        aggregate.audit_mut().stamp(&self.actor, Utc::now());

        let record = AggregateRecord::from_state(
            id,
            A::aggregate_type(),
            aggregate.version(),
            &*aggregate,
            aggregate.index_terms(),
        )?;
        let version = self.tx.save(record).await?;
        aggregate.set_version(version);

        self.writes += 1;
        self.cache_keys.extend(aggregate.cache_keys());
        Ok(())
    }

    /// Removes an aggregate's record.
    pub async fn delete<A: Aggregate + CacheDependent>(&mut self, aggregate: &A) -> Result<()> {
        let Some(id) = aggregate.id() else {
            return Ok(());
        };
        self.tx
            .delete(A::aggregate_type(), id, aggregate.version())
            .await?;
        self.writes += 1;
        self.cache_keys.extend(aggregate.cache_keys());
        Ok(())
    }

    /// Adds cache keys to evict after commit.
    pub fn invalidate(&mut self, keys: impl IntoIterator<Item = CacheKey>) {
        self.cache_keys.extend(keys);
    }

    /// Writes the collected events to the outbox and commits.
    ///
    /// A unit of work that changed nothing is rolled back instead, so a
    /// read-only command never contends with concurrent writers.
    pub async fn commit(mut self) -> Result<Committed> {
        if self.writes == 0 && self.events.is_empty() {
            self.tx.rollback().await?;
            debug!(correlation_id = %self.correlation_id, "Unit of work had no changes");
            return Ok(Committed::default());
        }

        self.tx.append_outbox(self.events.clone()).await?;
        self.tx.commit().await?;
        metrics::counter!("unit_of_work_commits_total").increment(1);
        debug!(
            correlation_id = %self.correlation_id,
            writes = self.writes,
            events = self.events.len(),
            "Unit of work committed"
        );
        Ok(Committed {
            events: self.events,
            cache_keys: self.cache_keys,
        })
    }

    /// Discards every staged change and raised event.
    pub async fn rollback(mut self) {
        metrics::counter!("unit_of_work_rollbacks_total").increment(1);
        if let Err(e) = self.tx.rollback().await {
            tracing::warn!(correlation_id = %self.correlation_id, error = %e, "Rollback failed; transaction dropped");
        }
    }
}

fn hydrate<A: Aggregate>(record: &AggregateRecord) -> Result<A> {
    let mut aggregate: A = record.to_state()?;
    aggregate.set_version(record.version);
    Ok(aggregate)
}
