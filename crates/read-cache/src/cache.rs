//! Cache contract.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::Result;

/// Longest lifetime a cache entry can have; longer TTLs are clamped to it.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// A key/value cache with per-entry expiry.
///
/// Used only to accelerate reads. Values are JSON documents so any backend
/// that stores strings can implement it.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the live value under `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous entry.
    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()>;

    /// Stores `value` only if no live entry exists. Returns whether it was stored.
    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> Result<bool>;

    /// Removes the entry. Returns whether a live entry was removed.
    async fn remove(&self, key: &str) -> Result<bool>;
}

/// Typed helpers over any [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize + Sync>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value, ttl).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}
