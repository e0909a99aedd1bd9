//! Post-commit cache eviction.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{Cache, CacheKey};

/// Evicts cache entries after a unit of work commits.
///
/// Eviction failures are logged and counted but never returned: the commit
/// has already happened and entries expire on their own.
#[derive(Clone)]
pub struct CacheInvalidator {
    cache: Arc<dyn Cache>,
}

impl CacheInvalidator {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Removes every key, in order. Duplicate keys are removed once.
    pub async fn invalidate(&self, keys: &[CacheKey]) {
        let mut seen = Vec::with_capacity(keys.len());
        for key in keys {
            if seen.contains(key) {
                continue;
            }
            seen.push(*key);

            let key = key.to_string();
            match self.cache.remove(&key).await {
                Ok(removed) => {
                    metrics::counter!("cache_invalidations_total").increment(1);
                    debug!(key = %key, removed, "Cache entry invalidated");
                }
                Err(e) => {
                    metrics::counter!("cache_invalidation_failures_total").increment(1);
                    warn!(key = %key, error = %e, "Failed to invalidate cache entry");
                }
            }
        }
    }
}
