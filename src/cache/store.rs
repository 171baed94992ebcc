//! TTL Cache Module
//!
//! Cache engine combining HashMap storage with a recency index and TTL expiration.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::{CacheEntry, CacheStats, RecencyIndex};
use crate::clock::SharedClock;
use crate::error::{GatewayError, Result};

// == TTL Cache ==
/// Bounded key-value store with TTL expiry and least-recently-accessed eviction.
///
/// Only reads (`get`, `peek`, a positive `has`) refresh an entry's recency.
/// Overwriting an existing key replaces its value and expiry in place.
#[derive(Debug)]
pub struct TtlCache<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// Access order for eviction
    recency: RecencyIndex,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed
    max_entries: usize,
    /// TTL for entries stored without an explicit one
    default_ttl: Duration,
    clock: SharedClock,
}

impl<V: Clone> TtlCache<V> {
    // == Constructor ==
    /// Creates a new cache with the given capacity and default TTL.
    ///
    /// # Errors
    /// [`GatewayError::Configuration`] when the capacity or the default TTL is zero.
    pub fn new(max_entries: usize, default_ttl: Duration, clock: SharedClock) -> Result<Self> {
        if max_entries == 0 {
            return Err(GatewayError::Configuration(
                "cache capacity must be at least 1".to_string(),
            ));
        }
        if default_ttl.is_zero() {
            return Err(GatewayError::Configuration(
                "cache default TTL must be positive".to_string(),
            ));
        }

        Ok(Self {
            entries: HashMap::new(),
            recency: RecencyIndex::new(),
            stats: CacheStats::new(),
            max_entries,
            default_ttl,
            clock,
        })
    }

    // == Get ==
    /// Retrieves a value by key.
    ///
    /// Returns the value if found and not expired, recording a hit.
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let value = self.touch_live(key).map(|entry| entry.value.clone());
        if value.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        value
    }

    // == Peek ==
    /// Like `get`, but leaves hit/miss counters untouched.
    pub fn peek(&mut self, key: &str) -> Option<V> {
        self.touch_live(key).map(|entry| entry.value.clone())
    }

    /// Like `get`, but only a hit is counted.
    ///
    /// For lookups whose outcome is settled later by a counted `get`.
    pub fn try_hit(&mut self, key: &str) -> Option<V> {
        let value = self.touch_live(key).map(|entry| entry.value.clone());
        if value.is_some() {
            self.stats.record_hit();
        }
        value
    }

    // == Has ==
    /// Existence check with the same lazy expiry as `get`, without counting.
    pub fn has(&mut self, key: &str) -> bool {
        self.touch_live(key).is_some()
    }

    // == Set ==
    /// Stores a value with an optional TTL (default TTL if `None`).
    ///
    /// Inserting a new key into a full cache first evicts the least recently
    /// accessed entry; that key is returned. Overwrites never evict.
    pub fn set(&mut self, key: String, value: V, ttl: Option<Duration>) -> Option<String> {
        let now = self.clock.now_ms();
        let ttl_ms = ttl.unwrap_or(self.default_ttl).as_millis() as u64;
        let mut evicted = None;

        if let Some(existing) = self.entries.get_mut(&key) {
            existing.value = value;
            existing.created_at = now;
            existing.expires_at = now.saturating_add(ttl_ms);
        } else {
            if self.entries.len() >= self.max_entries {
                evicted = self.evict_oldest();
            }
            let seq = self.recency.insert(&key);
            self.entries
                .insert(key, CacheEntry::new(value, now, ttl_ms, seq));
        }

        self.stats.record_set();
        evicted
    }

    // == Delete ==
    /// Removes an entry by key, returning whether one was present.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.remove_entry(key).is_some() {
            self.stats.record_delete();
            true
        } else {
            false
        }
    }

    // == Clear ==
    /// Removes every entry and resets statistics to zero.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recency.clear();
        self.stats = CacheStats::new();
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.entries.len())
    }

    // == Purge Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn purge_expired(&mut self) -> usize {
        let now = self.clock.now_ms();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
            self.stats.record_expiration();
        }

        expired_keys.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Current time according to this cache's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    // == Internal Helpers ==
    /// Returns the live entry for `key`, refreshing its recency.
    ///
    /// An expired entry is physically removed and reported as absent.
    fn touch_live(&mut self, key: &str) -> Option<&mut CacheEntry<V>> {
        let now = self.clock.now_ms();
        if self.entries.get(key)?.is_expired(now) {
            self.remove_entry(key);
            self.stats.record_expiration();
            return None;
        }

        let entry = self.entries.get_mut(key)?;
        entry.last_accessed_at = now;
        entry.access_seq = self.recency.touch(entry.access_seq);
        Some(entry)
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(entry.access_seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let oldest = self.recency.oldest()?.to_string();
        self.remove_entry(&oldest);
        self.stats.record_eviction();
        Some(oldest)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock(max_entries: usize) -> (TtlCache<String>, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        let store = TtlCache::new(max_entries, Duration::from_secs(300), clock.shared()).unwrap();
        (store, clock)
    }

    fn set(store: &mut TtlCache<String>, key: &str, value: &str) -> Option<String> {
        store.set(key.to_string(), value.to_string(), None)
    }

    #[test]
    fn test_store_new_rejects_zero_capacity() {
        let result = TtlCache::<String>::new(0, Duration::from_secs(1), ManualClock::default().shared());
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_store_new_rejects_zero_ttl() {
        let result = TtlCache::<String>::new(10, Duration::ZERO, ManualClock::default().shared());
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[test]
    fn test_store_set_and_get() {
        let (mut store, _) = store_with_clock(100);

        set(&mut store, "key1", "value1");

        assert_eq!(store.get("key1"), Some("value1".to_string()));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_store_get_nonexistent() {
        let (mut store, _) = store_with_clock(100);

        assert_eq!(store.get("nonexistent"), None);
        assert_eq!(store.stats().misses, 1);
    }

    #[test]
    fn test_store_delete() {
        let (mut store, _) = store_with_clock(100);

        set(&mut store, "key1", "value1");
        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));

        assert!(store.is_empty());
        assert_eq!(store.stats().deletes, 1);
    }

    #[test]
    fn test_store_overwrite() {
        let (mut store, _) = store_with_clock(100);

        set(&mut store, "key1", "value1");
        set(&mut store, "key1", "value2");

        assert_eq!(store.get("key1"), Some("value2".to_string()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.stats().sets, 2);
    }

    #[test]
    fn test_store_ttl_expiration() {
        let (mut store, clock) = store_with_clock(100);

        store.set("key1".to_string(), "value1".to_string(), Some(Duration::from_secs(1)));
        assert!(store.get("key1").is_some());

        clock.advance(Duration::from_millis(1_500));

        assert_eq!(store.get("key1"), None);
        // The expired entry was physically removed by the read
        assert_eq!(store.len(), 0);
        assert_eq!(store.stats().expirations, 1);
    }

    #[test]
    fn test_store_has_does_not_count() {
        let (mut store, clock) = store_with_clock(100);

        store.set("key1".to_string(), "v".to_string(), Some(Duration::from_secs(1)));
        assert!(store.has("key1"));
        assert!(!store.has("missing"));

        clock.advance(Duration::from_secs(1));
        assert!(!store.has("key1"));

        let stats = store.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_store_try_hit_counts_hits_only() {
        let (mut store, _) = store_with_clock(100);
        set(&mut store, "key1", "value1");

        assert_eq!(store.try_hit("key1"), Some("value1".to_string()));
        assert_eq!(store.try_hit("missing"), None);

        let stats = store.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn test_store_eviction_removes_oldest_accessed() {
        let (mut store, _) = store_with_clock(3);

        set(&mut store, "key1", "value1");
        set(&mut store, "key2", "value2");
        set(&mut store, "key3", "value3");

        let evicted = set(&mut store, "key4", "value4");

        assert_eq!(evicted.as_deref(), Some("key1"));
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("key1"), None);
        assert!(store.get("key2").is_some());
        assert!(store.get("key3").is_some());
        assert!(store.get("key4").is_some());
        assert_eq!(store.stats().evictions, 1);
    }

    #[test]
    fn test_store_read_refreshes_recency() {
        let (mut store, clock) = store_with_clock(3);

        set(&mut store, "key1", "value1");
        clock.advance(Duration::from_millis(10));
        set(&mut store, "key2", "value2");
        clock.advance(Duration::from_millis(10));
        set(&mut store, "key3", "value3");
        clock.advance(Duration::from_millis(10));

        store.get("key1");

        assert_eq!(set(&mut store, "key4", "value4").as_deref(), Some("key2"));
        assert!(store.get("key1").is_some());
    }

    #[test]
    fn test_store_has_refreshes_recency() {
        let (mut store, _) = store_with_clock(2);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");
        assert!(store.has("a"));

        assert_eq!(set(&mut store, "c", "3").as_deref(), Some("b"));
    }

    #[test]
    fn test_store_overwrite_keeps_recency_position() {
        let (mut store, _) = store_with_clock(2);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");
        // Writing "a" again does not make it recent
        set(&mut store, "a", "1b");

        assert_eq!(set(&mut store, "c", "3").as_deref(), Some("a"));
        assert_eq!(store.get("b"), Some("2".to_string()));
    }

    #[test]
    fn test_store_overwrite_at_capacity_never_evicts() {
        let (mut store, _) = store_with_clock(2);

        set(&mut store, "a", "1");
        set(&mut store, "b", "2");

        assert_eq!(set(&mut store, "b", "3"), None);
        assert_eq!(store.len(), 2);
        assert_eq!(store.stats().evictions, 0);
    }

    #[test]
    fn test_store_stats_hit_rate() {
        let (mut store, _) = store_with_clock(100);

        set(&mut store, "key1", "value1");
        store.get("key1");
        store.get("key1");
        store.get("nonexistent");

        let stats = store.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_store_clear_resets_everything() {
        let (mut store, _) = store_with_clock(100);

        set(&mut store, "key1", "value1");
        set(&mut store, "key2", "value2");
        store.get("key1");
        store.clear();

        assert_eq!(store.len(), 0);
        let stats = store.stats();
        assert_eq!(stats, CacheStats::new());

        assert_eq!(store.get("key1"), None);
        assert_eq!(store.get("key2"), None);
    }

    #[test]
    fn test_store_purge_expired() {
        let (mut store, clock) = store_with_clock(100);

        store.set("key1".to_string(), "value1".to_string(), Some(Duration::from_secs(1)));
        store.set("key2".to_string(), "value2".to_string(), Some(Duration::from_secs(10)));

        clock.advance(Duration::from_millis(1_100));

        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("key2").is_some());
    }
}
