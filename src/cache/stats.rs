//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, writes and removals.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of a cache's counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (key not found or expired)
    pub misses: u64,
    /// Number of `set` calls
    pub sets: u64,
    /// Number of explicit deletions that removed an entry
    pub deletes: u64,
    /// Number of entries evicted to make room for a new key
    pub evictions: u64,
    /// Number of entries purged because their TTL elapsed
    pub expirations: u64,
    /// Current number of entries in the cache
    pub size: usize,
    /// hits / (hits + misses), 0 when nothing was read yet
    pub hit_rate: f64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn compute_hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_set(&mut self) {
        self.sets += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    // == Snapshot ==
    /// Returns a copy with `size` and `hit_rate` filled in.
    pub fn snapshot(&self, size: usize) -> Self {
        Self {
            size,
            hit_rate: self.compute_hit_rate(),
            ..self.clone()
        }
    }
}
