//! In-process cache backed by `moka`
//!
//! Each entry carries its own time-to-live. moka evicts through the
//! [`Expiry`] policy; lookups additionally compare against `expires_at`
//! because moka's eviction runs lazily. TTLs of [`MAX_TTL`] or more, or
//! ones the clock cannot represent, never expire.

use crate::cache::{CacheStats, Counters, TransformationCache};
use crate::key::CacheKey;
use moka::future::Cache;
use moka::Expiry;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default entry bound
pub const DEFAULT_MAX_CAPACITY: u64 = 10_000;

/// Longest lifetime tracked; longer TTLs mean "never expires"
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug)]
struct CachedEntry {
    value: Value,
    /// `None` never expires
    ttl: Option<Duration>,
    expires_at: Option<Instant>,
}

impl CachedEntry {
    fn new(value: Value, ttl: Duration, now: Instant) -> Self {
        let expires_at = (ttl < MAX_TTL).then(|| now.checked_add(ttl)).flatten();
        Self {
            value,
            ttl: expires_at.map(|_| ttl),
            expires_at,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

struct PerEntryTtl;

impl Expiry<CacheKey, Arc<CachedEntry>> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &CacheKey,
        value: &Arc<CachedEntry>,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// Bounded in-memory transformation cache
pub struct MokaTransformationCache {
    cache: Cache<CacheKey, Arc<CachedEntry>>,
    counters: Counters,
}

impl MokaTransformationCache {
    /// Create cache holding at most `max_capacity` entries
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();

        Self {
            cache,
            counters: Counters::default(),
        }
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    /// Apply pending evictions so `entry_count` is exact
    pub async fn sync(&self) {
        self.cache.run_pending_tasks().await;
    }
}

impl Default for MokaTransformationCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CAPACITY)
    }
}

impl std::fmt::Debug for MokaTransformationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MokaTransformationCache")
            .field("entry_count", &self.cache.entry_count())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl TransformationCache for MokaTransformationCache {
    async fn get(&self, key: &CacheKey) -> Option<Value> {
        match self.cache.get(key).await {
            Some(entry) if entry.is_live(Instant::now()) => {
                self.counters.hit();
                tracing::debug!(key = %key, "Cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                self.cache.invalidate(key).await;
                self.counters.miss();
                tracing::debug!(key = %key, "Cache entry expired");
                None
            }
            None => {
                self.counters.miss();
                tracing::debug!(key = %key, "Cache miss");
                None
            }
        }
    }

    async fn put(&self, key: CacheKey, value: Value, ttl: Duration) {
        let entry = CachedEntry::new(value, ttl, Instant::now());
        self.cache.insert(key, Arc::new(entry)).await;
        self.counters.insert();
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.cache.entry_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_content::Fingerprint;
    use serde_json::json;

    fn key(stage: &str) -> CacheKey {
        CacheKey::derive(&Fingerprint::of_text("contract"), stage, &json!({}))
    }

    #[tokio::test]
    async fn put_then_get() {
        let cache = MokaTransformationCache::default();
        cache
            .put(key("review"), json!([{"severity": "high"}]), Duration::from_secs(60))
            .await;

        assert_eq!(
            cache.get(&key("review")).await,
            Some(json!([{"severity": "high"}]))
        );
        assert_eq!(cache.get(&key("other")).await, None);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.inserts), (1, 1, 1));
    }

    #[tokio::test]
    async fn zero_ttl_is_never_served() {
        let cache = MokaTransformationCache::default();
        cache.put(key("review"), json!("x"), Duration::ZERO).await;
        assert_eq!(cache.get(&key("review")).await, None);
    }

    #[tokio::test]
    async fn expired_entry_is_a_miss() {
        let cache = MokaTransformationCache::default();
        cache
            .put(key("review"), json!("x"), Duration::from_millis(20))
            .await;
        assert!(cache.get(&key("review")).await.is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&key("review")).await, None);
    }

    #[tokio::test]
    async fn entries_keep_their_own_ttl() {
        let cache = MokaTransformationCache::default();
        cache
            .put(key("short"), json!(1), Duration::from_millis(20))
            .await;
        cache
            .put(key("long"), json!(2), Duration::from_secs(60))
            .await;

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.get(&key("short")).await, None);
        assert_eq!(cache.get(&key("long")).await, Some(json!(2)));
    }

    #[tokio::test]
    async fn unrepresentable_ttl_never_expires() {
        let cache = MokaTransformationCache::default();
        cache.put(key("a"), json!(1), Duration::MAX).await;
        cache
            .put(key("b"), json!(2), Duration::from_secs(u64::MAX))
            .await;

        assert_eq!(cache.get(&key("a")).await, Some(json!(1)));
        assert_eq!(cache.get(&key("b")).await, Some(json!(2)));
    }

    #[test]
    fn ttl_at_or_above_max_is_unbounded() {
        let now = Instant::now();
        let entry = CachedEntry::new(json!(null), MAX_TTL, now);
        assert_eq!((entry.ttl, entry.expires_at), (None, None));
        assert!(entry.is_live(now + Duration::from_secs(3600)));

        let bounded = CachedEntry::new(json!(null), Duration::from_secs(5), now);
        assert_eq!(bounded.ttl, Some(Duration::from_secs(5)));
        assert!(!bounded.is_live(now + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn clear_drops_entries() {
        let cache = MokaTransformationCache::default();
        cache.put(key("a"), json!(1), Duration::from_secs(60)).await;
        cache.clear();
        cache.sync().await;

        assert_eq!(cache.get(&key("a")).await, None);
        assert_eq!(cache.stats().entry_count, 0);
    }
}
