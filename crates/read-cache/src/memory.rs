//! In-memory cache implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{Cache, CacheError, MAX_TTL, Result};

struct Entry {
    value: Value,
    expires_at: Instant,
}

impl Entry {
    fn new(value: Value, now: Instant, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: now + ttl.min(MAX_TTL),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// A process-local cache with per-entry expiry.
///
/// Expired entries are dropped lazily on access. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every operation fail with [`CacheError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.is_live(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("in-memory cache disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        self.check_available()?;
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }
        // Expired: drop it unless someone replaced it meanwhile.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        self.check_available()?;
        let entry = Entry::new(value, Instant::now(), ttl);
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: Value, ttl: Duration) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|e| e.is_live(now)) {
            return Ok(false);
        }
        entries.insert(key.to_string(), Entry::new(value, now, ttl));
        Ok(true)
    }

    async fn remove(&self, key: &str) -> Result<bool> {
        self.check_available()?;
        let now = Instant::now();
        let removed = self.entries.write().await.remove(key);
        Ok(removed.is_some_and(|e| e.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn set_then_get() {
        let cache = InMemoryCache::new();
        cache.set("k", json!({"a": 1}), TTL).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(cache.get("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_after_remove_misses_until_next_set() {
        let cache = InMemoryCache::new();
        cache.set("k", json!(1), TTL).await.unwrap();

        assert!(cache.remove("k").await.unwrap());
        for _ in 0..3 {
            assert_eq!(cache.get("k").await.unwrap(), None);
        }
        assert!(!cache.remove("k").await.unwrap());

        cache.set("k", json!(2), TTL).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn entries_expire() {
        let cache = InMemoryCache::new();
        cache
            .set("k", json!(1), Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn set_if_absent_respects_live_entries() {
        let cache = InMemoryCache::new();
        assert!(cache.set_if_absent("k", json!(1), TTL).await.unwrap());
        assert!(!cache.set_if_absent("k", json!(2), TTL).await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), Some(json!(1)));

        cache
            .set("short", json!(1), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.set_if_absent("short", json!(2), TTL).await.unwrap());
    }

    #[tokio::test]
    async fn huge_ttls_are_clamped() {
        let cache = InMemoryCache::new();
        cache.set("k", json!(1), Duration::MAX).await.unwrap();
        assert!(cache.set_if_absent("other", json!(2), Duration::MAX).await.unwrap());

        assert_eq!(cache.get("k").await.unwrap(), Some(json!(1)));
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn unavailable_cache_fails_every_call() {
        let cache = InMemoryCache::new();
        cache.set_unavailable(true);
        assert!(matches!(
            cache.get("k").await,
            Err(CacheError::Unavailable(_))
        ));
        assert!(cache.set("k", json!(1), TTL).await.is_err());
        assert!(cache.remove("k").await.is_err());

        cache.set_unavailable(false);
        assert!(cache.set("k", json!(1), TTL).await.is_ok());
    }

    #[tokio::test]
    async fn clones_share_entries() {
        let cache = InMemoryCache::new();
        let other = cache.clone();
        cache.set("k", json!("v"), TTL).await.unwrap();
        assert_eq!(other.get("k").await.unwrap(), Some(json!("v")));
    }
}
