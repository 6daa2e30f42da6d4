//! Cache Store Implementation
//!
//! Key/value store with per-entry TTL, used for the metadata and local-path
//! entries of the resolver. Values are JSON strings so the store stays
//! agnostic of what the resolver keeps in it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use moka::sync::Cache;
use moka::Expiry;
use tracing::{debug, trace};

/// Default upper bound on the number of entries
const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// TTL-aware key/value store
pub trait CacheStore: Send + Sync {
    /// Get a live value
    fn get(&self, key: &str) -> Option<String>;

    /// Insert or replace a value, expiring after `ttl`
    fn set(&self, key: &str, value: String, ttl: Duration);

    /// Remove a single key
    fn delete(&self, key: &str);

    /// Remove every key starting with `prefix`, returning how many were removed
    fn delete_prefix(&self, prefix: &str) -> usize;
}

/// Stored value together with its own TTL
#[derive(Clone, Debug)]
struct CachedValue {
    value: String,
    ttl: Duration,
}

/// Expiry policy reading the TTL off each entry
struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache store backed by Moka
pub struct MemoryCacheStore {
    cache: Cache<String, CachedValue>,
    /// Cache hit counter
    hits: AtomicU64,
    /// Cache miss counter
    misses: AtomicU64,
}

impl MemoryCacheStore {
    /// Create a store with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    /// Create a store holding at most `max_entries` entries
    pub fn with_capacity(max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .name("splat_transients")
            .build();

        Self {
            cache,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Number of live entries (approximate, Moka counts lazily)
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Get cache statistics
    ///
    /// Returns (hits, misses, hit_rate)
    pub fn stats(&self) -> (u64, u64, f64) {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        (hits, misses, hit_rate)
    }

    /// Log current cache metrics
    pub fn log_metrics(&self) {
        let (hits, misses, hit_rate) = self.stats();
        debug!(
            hits = hits,
            misses = misses,
            hit_rate = format!("{:.1}%", hit_rate),
            entries = self.entry_count(),
            "Cache metrics"
        );
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheStore for MemoryCacheStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.cache.get(key) {
            Some(cached) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = key, "Cache HIT");
                Some(cached.value)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(key = key, "Cache MISS");
                None
            }
        }
    }

    fn set(&self, key: &str, value: String, ttl: Duration) {
        self.cache.insert(key.to_string(), CachedValue { value, ttl });
        debug!(key = key, ttl_secs = ttl.as_secs(), "Cached entry");
    }

    fn delete(&self, key: &str) {
        self.cache.invalidate(key);
        debug!(key = key, "Invalidated cache entry");
    }

    fn delete_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<_> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();

        for key in &keys {
            self.cache.invalidate(key.as_str());
        }
        debug!(prefix = prefix, removed = keys.len(), "Invalidated cache entries by prefix");
        keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    #[test]
    fn test_cache_hit_miss() {
        let store = MemoryCacheStore::new();

        // Initially miss
        assert!(store.get("splat_data_1").is_none());
        let (_, _, hit_rate) = store.stats();
        assert_eq!(hit_rate, 0.0);

        // Insert and hit
        store.set("splat_data_1", "{}".to_string(), HOUR);
        assert_eq!(store.get("splat_data_1").as_deref(), Some("{}"));

        let (hits, misses, hit_rate) = store.stats();
        assert_eq!(hits, 1);
        assert_eq!(misses, 1);
        assert!(hit_rate > 49.0 && hit_rate < 51.0); // ~50%
    }

    #[test]
    fn test_delete() {
        let store = MemoryCacheStore::new();
        store.set("splat_data_1", "a".to_string(), HOUR);
        store.delete("splat_data_1");
        assert!(store.get("splat_data_1").is_none());
    }

    #[test]
    fn test_delete_prefix_leaves_other_keys() {
        let store = MemoryCacheStore::new();
        store.set("splat_data_1", "a".to_string(), HOUR);
        store.set("splat_local_1", "b".to_string(), HOUR);
        store.set("other_key", "c".to_string(), HOUR);

        assert_eq!(store.delete_prefix("splat_"), 2);
        assert!(store.get("splat_data_1").is_none());
        assert!(store.get("splat_local_1").is_none());
        assert_eq!(store.get("other_key").as_deref(), Some("c"));
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let store = MemoryCacheStore::new();
        store.set("short", "x".to_string(), Duration::from_millis(50));
        store.set("long", "y".to_string(), HOUR);

        std::thread::sleep(Duration::from_millis(200));

        assert!(store.get("short").is_none());
        assert_eq!(store.get("long").as_deref(), Some("y"));
    }

    #[test]
    fn test_overwrite_takes_new_ttl() {
        let store = MemoryCacheStore::new();
        store.set("key", "old".to_string(), HOUR);
        store.set("key", "new".to_string(), Duration::from_millis(50));

        std::thread::sleep(Duration::from_millis(200));
        assert!(store.get("key").is_none());
    }
}
