//! Single-flight cache for computed aggregates
//!
//! Each key owns a `tokio::sync::OnceCell`. The first caller for a key runs the
//! computation; concurrent callers for the same key await that computation
//! instead of starting their own. A failed computation leaves the cell empty,
//! so the next caller retries.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{HyroxError, Result};

/// Cache statistics and metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    pub total_lookups: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    /// Get hit rate as percentage
    pub fn hit_rate(&self) -> f64 {
        if self.total_lookups == 0 {
            return 0.0;
        }
        (self.cache_hits as f64 / self.total_lookups as f64) * 100.0
    }
}

pub struct AggregateCache<K, V> {
    entries: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
    metrics: Mutex<CacheMetrics>,
}

impl<K, V> Default for AggregateCache<K, V> {
    fn default() -> Self {
        AggregateCache {
            entries: Mutex::new(HashMap::new()),
            metrics: Mutex::new(CacheMetrics::default()),
        }
    }
}

impl<K, V> AggregateCache<K, V>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached value for `key`, computing it at most once at a time
    pub async fn get_or_compute<F, Fut>(&self, key: K, compute: F) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cell = {
            let mut entries = self.entries()?;
            entries
                .entry(key.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let mut computed = false;
        let result = cell
            .get_or_try_init(|| {
                computed = true;
                compute()
            })
            .await
            .cloned();

        let mut metrics = self.metrics()?;
        metrics.total_lookups += 1;
        if computed {
            metrics.cache_misses += 1;
            debug!(?key, ok = result.is_ok(), "Computed aggregate");
        } else {
            metrics.cache_hits += 1;
        }

        result
    }

    /// Drop the entry for `key`; returns whether one existed
    pub fn invalidate(&self, key: &K) -> Result<bool> {
        let removed = self.entries()?.remove(key).is_some();
        if removed {
            self.metrics()?.evictions += 1;
        }
        Ok(removed)
    }

    pub fn clear(&self) -> Result<()> {
        let mut entries = self.entries()?;
        let count = entries.len() as u64;
        entries.clear();
        self.metrics()?.evictions += count;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries()?.is_empty())
    }

    pub fn metrics(&self) -> Result<MutexGuard<'_, CacheMetrics>> {
        self.metrics
            .lock()
            .map_err(|_| HyroxError::Internal("aggregate cache metrics lock poisoned".to_string()))
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<K, Arc<OnceCell<V>>>>> {
        self.entries
            .lock()
            .map_err(|_| HyroxError::Internal("aggregate cache lock poisoned".to_string()))
    }
}
