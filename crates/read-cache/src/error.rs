//! Cache error types.

use thiserror::Error;

/// Errors that can occur while talking to the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend could not be reached or refused the operation.
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    /// A cached value could not be encoded or decoded.
    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
