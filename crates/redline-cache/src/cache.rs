//! Cache trait and the disabled cache

use crate::key::CacheKey;
use redline_content::Fingerprint;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Memoizes stage outputs keyed by `(fingerprint, stage, config)`
///
/// Lookups never fail: an unavailable, stale, or absent entry is a miss.
#[async_trait::async_trait]
pub trait TransformationCache: Send + Sync + fmt::Debug {
    /// Fetch a live entry
    async fn get(&self, key: &CacheKey) -> Option<Value>;

    /// Store an entry that expires after `ttl`
    async fn put(&self, key: CacheKey, value: Value, ttl: Duration);

    /// Counters since construction
    fn stats(&self) -> CacheStats;

    /// Fetch by derived key
    async fn lookup(&self, fingerprint: &Fingerprint, stage: &str, config: &Value) -> Option<Value> {
        self.get(&CacheKey::derive(fingerprint, stage, config)).await
    }

    /// Store by derived key
    async fn store(
        &self,
        fingerprint: &Fingerprint,
        stage: &str,
        config: &Value,
        value: Value,
        ttl: Duration,
    ) {
        self.put(CacheKey::derive(fingerprint, stage, config), value, ttl)
            .await;
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub entry_count: u64,
}

impl CacheStats {
    /// Fraction of lookups served from cache
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Shared hit/miss/insert counters
#[derive(Debug, Default)]
pub(crate) struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
}

impl Counters {
    pub(crate) fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn insert(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, entry_count: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            entry_count,
        }
    }
}

/// Cache that never holds anything
#[derive(Debug, Default)]
pub struct NullCache {
    counters: Counters,
}

impl NullCache {
    /// Create null cache
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TransformationCache for NullCache {
    async fn get(&self, _key: &CacheKey) -> Option<Value> {
        self.counters.miss();
        None
    }

    async fn put(&self, _key: CacheKey, _value: Value, _ttl: Duration) {}

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(0)
    }
}
