pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod record;
pub mod store;

pub use common::AggregateId;
pub use error::{Result, StoreError};
pub use event::{EventEnvelope, EventEnvelopeBuilder, EventId, Version};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::RecordQuery;
pub use record::AggregateRecord;
pub use store::{AggregateStore, StoreTransaction};
