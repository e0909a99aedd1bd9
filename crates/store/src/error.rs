use thiserror::Error;

use crate::{AggregateId, Version};

/// Errors that can occur when interacting with the aggregate store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record changed since this transaction read it.
    #[error(
        "Concurrency conflict for {aggregate_type} {aggregate_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        aggregate_type: String,
        aggregate_id: AggregateId,
        expected: Version,
        actual: Version,
    },

    /// The transaction was already committed or rolled back.
    #[error("Transaction is no longer open")]
    TransactionClosed,

    /// An event envelope was built without a required field.
    #[error("Event envelope is missing {0}")]
    IncompleteEnvelope(&'static str),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        match self {
            StoreError::ConcurrencyConflict { .. } => true,
            // serialization_failure, deadlock_detected
            StoreError::Database(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }

    /// I/O faults that may succeed when the whole unit of work is retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::Database(
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
            )
        )
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
