//! L1 Memory Cache
//!
//! LRU map bounded by an entry ceiling and a total byte budget, with an
//! optional time-to-live measured from insertion. Expired entries are
//! dropped lazily when they are next looked up.
//!
//! Thread-safe via interior mutability using parking_lot::Mutex.

use std::sync::Arc;
use std::time::Duration;

use codeloom_core::{system_clock, Clock};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

use crate::config::MemoryCacheConfig;

/// Cache metrics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheMetrics {
    /// Lookups that returned a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// Entries removed to satisfy the size or item bounds
    pub evictions: u64,
    /// Entries removed because their TTL elapsed
    pub expirations: u64,
}

impl CacheMetrics {
    /// Get hit rate as a fraction (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Entry<V> {
    value: V,
    size: usize,
    /// Absolute expiry in epoch millis
    expires_at: Option<u64>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Inner state (protected by Mutex)
struct MemoryState<V> {
    /// Most recently used entries are at the front
    entries: LruCache<String, Entry<V>>,
    current_size: usize,
    metrics: CacheMetrics,
}

impl<V> MemoryState<V> {
    fn remove(&mut self, key: &str) -> Option<Entry<V>> {
        let entry = self.entries.pop(key)?;
        self.current_size = self.current_size.saturating_sub(entry.size);
        Some(entry)
    }
}

/// Bounded in-memory LRU cache.
///
/// All methods take `&self`; the cache can be shared behind an `Arc`.
pub struct MemoryCache<V> {
    max_size: usize,
    max_items: usize,
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    state: Mutex<MemoryState<V>>,
}

impl<V: Clone> MemoryCache<V> {
    /// Create a cache using the wall clock
    pub fn new(config: &MemoryCacheConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Create a cache driven by `clock`
    pub fn with_clock(config: &MemoryCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            max_size: config.max_size,
            max_items: config.max_items,
            default_ttl: config.ttl(),
            clock,
            state: Mutex::new(MemoryState {
                // Bounds are enforced by hand, on bytes as well as items
                entries: LruCache::unbounded(),
                current_size: 0,
                metrics: CacheMetrics::default(),
            }),
        }
    }

    /// Look up a live entry and mark it most recently used.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now_millis();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        match state.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                let value = entry.value.clone();
                state.metrics.hits += 1;
                return Some(value);
            }
            Some(_) => {
                trace!("Memory cache entry expired: {}", key);
                state.remove(key);
                state.metrics.expirations += 1;
            }
            None => {}
        }

        state.metrics.misses += 1;
        None
    }

    /// Insert or replace an entry using the configured TTL.
    ///
    /// Returns `false` when the value alone exceeds the byte budget and was
    /// therefore not stored.
    pub fn set(&self, key: impl Into<String>, value: V, size: usize) -> bool {
        self.set_with_ttl(key, value, size, self.default_ttl)
    }

    /// Insert or replace an entry with an explicit TTL (`None` never expires).
    pub fn set_with_ttl(
        &self,
        key: impl Into<String>,
        value: V,
        size: usize,
        ttl: Option<Duration>,
    ) -> bool {
        let key = key.into();
        let expires_at = ttl.map(|ttl| self.clock.now_millis() + ttl.as_millis() as u64);

        let mut state = self.state.lock();
        // A replaced value is stale whether or not the new one fits
        state.remove(&key);

        if size > self.max_size {
            trace!(
                "Value for {} ({} bytes) exceeds memory budget, not cached",
                key,
                size
            );
            return false;
        }

        state.entries.put(
            key,
            Entry {
                value,
                size,
                expires_at,
            },
        );
        state.current_size += size;

        // The newest entry sits at the front and fits on its own, so this
        // stops before reaching it
        while state.entries.len() > self.max_items || state.current_size > self.max_size {
            match state.entries.pop_lru() {
                Some((evicted_key, entry)) => {
                    trace!("Evicting {} ({} bytes)", evicted_key, entry.size);
                    state.current_size = state.current_size.saturating_sub(entry.size);
                    state.metrics.evictions += 1;
                }
                None => break,
            }
        }
        true
    }

    /// Whether a live entry exists. Does not touch LRU order or metrics.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.now_millis();
        self.state
            .lock()
            .entries
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    /// Remove an entry, returning its value
    pub fn remove(&self, key: &str) -> Option<V> {
        self.state.lock().remove(key).map(|entry| entry.value)
    }

    /// Drop every expired entry now, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_millis();
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            state.remove(key);
        }
        state.metrics.expirations += expired.len() as u64;
        expired.len()
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.current_size = 0;
    }

    /// Number of stored entries (expired ones included until purged)
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently accounted for
    pub fn current_size(&self) -> usize {
        self.state.lock().current_size
    }

    /// Byte budget
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Entry ceiling
    pub fn max_items(&self) -> usize {
        self.max_items
    }

    /// Get a snapshot of cache metrics
    pub fn metrics(&self) -> CacheMetrics {
        self.state.lock().metrics.clone()
    }
}

impl<V> std::fmt::Debug for MemoryCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("max_size", &self.max_size)
            .field("max_items", &self.max_items)
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloom_core::ManualClock;
    use pretty_assertions::assert_eq;

    fn config(max_size: usize, max_items: usize, ttl_secs: Option<u64>) -> MemoryCacheConfig {
        MemoryCacheConfig {
            max_size,
            max_items,
            ttl_secs,
        }
    }

    #[test]
    fn test_set_then_get() {
        let cache = MemoryCache::new(&config(1024, 10, None));
        assert!(cache.set("k", "v".to_string(), 1));
        assert_eq!(cache.get("k"), Some("v".to_string()));
        assert_eq!(cache.get("other"), None);

        let metrics = cache.metrics();
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert!((metrics.hit_rate() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_replace_updates_size() {
        let cache = MemoryCache::new(&config(1024, 10, None));
        cache.set("k", 1u32, 100);
        cache.set("k", 2u32, 40);
        assert_eq!(cache.current_size(), 40);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn test_ttl_boundary() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = MemoryCache::with_clock(&config(1024, 10, Some(10)), clock.clone());
        cache.set("k", 1u32, 1);

        clock.set(9_999);
        assert_eq!(cache.get("k"), Some(1));

        clock.set(10_000);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.current_size(), 0);
        assert_eq!(cache.metrics().expirations, 1);
    }

    #[test]
    fn test_per_entry_ttl_overrides_default() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = MemoryCache::with_clock(&config(1024, 10, Some(10)), clock.clone());
        cache.set_with_ttl("forever", 1u32, 1, None);
        cache.set_with_ttl("short", 2u32, 1, Some(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get("forever"), Some(1));
        assert_eq!(cache.get("short"), None);

        clock.advance(Duration::from_secs(100));
        assert_eq!(cache.get("forever"), Some(1));
    }

    #[test]
    fn test_item_bound_evicts_lru() {
        let cache = MemoryCache::new(&config(1024, 2, None));
        cache.set("a", 1u32, 1);
        cache.set("b", 2u32, 1);
        // Touch a so b becomes least recently used
        assert_eq!(cache.get("a"), Some(1));
        cache.set("c", 3u32, 1);

        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.metrics().evictions, 1);
    }

    #[test]
    fn test_size_bound_evicts_until_fits() {
        let cache = MemoryCache::new(&config(100, 100, None));
        cache.set("a", 1u32, 40);
        cache.set("b", 2u32, 40);
        cache.set("c", 3u32, 70);

        assert!(!cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.current_size(), 70);
        assert!(cache.current_size() <= cache.max_size());
    }

    #[test]
    fn test_oversized_value_not_stored() {
        let cache = MemoryCache::new(&config(100, 10, None));
        cache.set("small", 1u32, 10);
        cache.set("k", 1u32, 10);

        assert!(!cache.set("k", 2u32, 101));
        assert_eq!(cache.get("k"), None);
        assert!(cache.contains("small"));
        assert_eq!(cache.current_size(), 10);
    }

    #[test]
    fn test_purge_expired() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = MemoryCache::with_clock(&config(1024, 10, Some(1)), clock.clone());
        cache.set("a", 1u32, 1);
        cache.set_with_ttl("b", 2u32, 1, None);

        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 1);
    }

    #[test]
    fn test_clear() {
        let cache = MemoryCache::new(&config(1024, 10, None));
        cache.set("a", 1u32, 5);
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.current_size(), 0);
    }
}
