//! Core aggregate and domain event traits.

use chrono::{DateTime, Utc};
use common::{Actor, AggregateId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use store::Version;

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: Serialize + DeserializeOwned + Send + Sync + Clone {
    /// Returns the event type name used when the event is published.
    fn event_type(&self) -> &'static str;
}

/// Trait for aggregates persisted as state.
///
/// Command methods take `&self`, validate invariants and return the events
/// describing the change without touching state. Applying those events is
/// the only way state changes, so a rejected command never leaves a partial
/// mutation behind.
pub trait Aggregate: Default + Serialize + DeserializeOwned + Send + Sync + Sized {
    /// The type of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// The type of errors this aggregate can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns None for a new, uninitialized aggregate.
    fn id(&self) -> Option<AggregateId>;

    /// The version the aggregate was loaded at.
    fn version(&self) -> Version;

    fn set_version(&mut self, version: Version);

    /// Applies an event to the aggregate, updating its state.
    ///
    /// Must be deterministic and must not fail: the event has already been
    /// validated by the command method that produced it.
    fn apply(&mut self, event: Self::Event);

    fn apply_events(&mut self, events: impl IntoIterator<Item = Self::Event>) {
        for event in events {
            self.apply(event);
        }
    }

    /// Secondary keys the store indexes this aggregate under.
    fn index_terms(&self) -> Vec<String> {
        Vec::new()
    }

    fn audit_mut(&mut self) -> &mut AuditInfo;
}

/// Who created and last changed an aggregate, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub created_at: Option<DateTime<Utc>>,
    pub created_by: Option<Actor>,
    pub updated_at: Option<DateTime<Utc>>,
    pub updated_by: Option<Actor>,
}

impl AuditInfo {
    /// Records a change; the first stamp also fills the creation fields.
    pub fn stamp(&mut self, actor: &Actor, at: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_at = Some(at);
            self.created_by = Some(actor.clone());
        }
        self.updated_at = Some(at);
        self.updated_by = Some(actor.clone());
    }
}
