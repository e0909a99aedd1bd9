use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{AggregateId, Result, Version};

/// The persisted state of one aggregate.
///
/// `version` is the version the record was read at. Saving a record writes
/// `version + 1` and fails if someone else wrote the record in between.
/// `index_terms` are secondary keys (e.g. `sku:ABC-1`, `customer:<id>`)
/// used by [`RecordQuery`](crate::RecordQuery) lookups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRecord {
    pub aggregate_id: AggregateId,

    /// The type of aggregate (e.g., "Order", "Product").
    pub aggregate_type: String,

    pub version: Version,

    pub state: serde_json::Value,

    pub index_terms: Vec<String>,

    pub updated_at: DateTime<Utc>,
}

impl AggregateRecord {
    /// Creates a record from a serializable aggregate state.
    pub fn from_state<T: Serialize>(
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        version: Version,
        state: &T,
        index_terms: Vec<String>,
    ) -> Result<Self> {
        Ok(Self {
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            version,
            state: serde_json::to_value(state)?,
            index_terms,
            updated_at: Utc::now(),
        })
    }

    /// Deserializes the stored state.
    pub fn to_state<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.state.clone())?)
    }

    pub fn has_term(&self, term: &str) -> bool {
        self.index_terms.iter().any(|t| t == term)
    }
}
