//! Rate-Limit Counter Store
//!
//! Per-identity window counters kept in a [`NamedCache`], so idle identities
//! expire with their window and the number of tracked identities is bounded.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::{CacheStats, NamedCache};
use crate::clock::SharedClock;
use crate::error::Result;
use crate::tasks::Sweep;

// == Counter ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitCounter {
    /// Requests observed in the current window
    pub count: u32,
    /// Unix milliseconds at which `count` goes back to zero
    pub window_reset_at: u64,
    pub limit: u32,
}

// == Observation ==
/// Counter state right after a request was counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    pub count: u32,
    pub limit: u32,
    pub window_reset_at: u64,
    pub now: u64,
}

impl Observation {
    pub fn over_limit(&self) -> bool {
        self.count > self.limit
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.count)
    }

    /// `ceil((window_reset_at - now) / 1000)`
    pub fn retry_after_secs(&self) -> u64 {
        self.window_reset_at.saturating_sub(self.now).div_ceil(1000)
    }
}

// == Counter Store ==
#[derive(Debug)]
pub struct CounterStore {
    counters: Arc<NamedCache<RateLimitCounter>>,
}

impl CounterStore {
    pub fn new(name: impl Into<String>, max_keys: usize, window: Duration, clock: SharedClock) -> Result<Self> {
        Ok(Self {
            counters: Arc::new(NamedCache::new(name, max_keys, window, clock)?),
        })
    }

    // == Observe ==
    /// Counts one request for `key` and returns the resulting state.
    ///
    /// A missing counter, or one whose window has elapsed, starts over at
    /// zero with a fresh window. `limit` replaces the stored limit in place;
    /// it never resets the count or the window. The whole read-modify-write
    /// happens under the store's lock.
    pub fn observe(&self, key: &str, limit: u32, window: Duration) -> Observation {
        self.counters.with_store(|store| {
            let now = store.now_ms();
            let mut counter = match store.get(key) {
                Some(counter) if now < counter.window_reset_at => counter,
                _ => RateLimitCounter {
                    count: 0,
                    window_reset_at: now.saturating_add(window.as_millis() as u64),
                    limit,
                },
            };

            counter.limit = limit;
            counter.count = counter.count.saturating_add(1);

            let observation = Observation {
                count: counter.count,
                limit: counter.limit,
                window_reset_at: counter.window_reset_at,
                now,
            };
            let ttl = Duration::from_millis(counter.window_reset_at - now);
            store.set(key.to_string(), counter, Some(ttl));
            observation
        })
    }

    /// Current counter for `key`, without counting a request.
    pub fn peek(&self, key: &str) -> Option<RateLimitCounter> {
        self.counters.peek(key)
    }

    pub fn reset(&self, key: &str) -> bool {
        self.counters.delete(key)
    }

    pub fn reset_all(&self) {
        self.counters.clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.stats()
    }

    pub fn sweep_target(&self) -> Arc<dyn Sweep> {
        Arc::clone(&self.counters) as Arc<dyn Sweep>
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    const WINDOW: Duration = Duration::from_secs(60);

    fn store() -> (CounterStore, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (CounterStore::new("test", 100, WINDOW, clock.shared()).unwrap(), clock)
    }

    #[test]
    fn test_counts_within_window() {
        let (store, _) = store();

        assert_eq!(store.observe("ip", 5, WINDOW).count, 1);
        assert_eq!(store.observe("ip", 5, WINDOW).count, 2);
        let third = store.observe("ip", 5, WINDOW);
        assert_eq!(third.count, 3);
        assert_eq!(third.remaining(), 2);
        assert_eq!(third.window_reset_at, 1_060_000);
    }

    #[test]
    fn test_window_resets_lazily() {
        let (store, clock) = store();

        store.observe("ip", 5, WINDOW);
        store.observe("ip", 5, WINDOW);
        clock.advance(WINDOW);

        let fresh = store.observe("ip", 5, WINDOW);
        assert_eq!(fresh.count, 1);
        assert_eq!(fresh.window_reset_at, 1_120_000);
    }

    #[test]
    fn test_limit_change_keeps_window() {
        let (store, clock) = store();

        store.observe("ip", 5, WINDOW);
        clock.advance(Duration::from_secs(10));
        let changed = store.observe("ip", 2, WINDOW);

        assert_eq!(changed.count, 2);
        assert_eq!(changed.limit, 2);
        assert_eq!(changed.window_reset_at, 1_060_000);
        assert_eq!(store.peek("ip").unwrap().limit, 2);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let obs = Observation {
            count: 4,
            limit: 3,
            window_reset_at: 10_001,
            now: 1,
        };
        assert!(obs.over_limit());
        assert_eq!(obs.retry_after_secs(), 10);

        let obs = Observation { now: 0, ..obs };
        assert_eq!(obs.retry_after_secs(), 11);
    }

    #[test]
    fn test_reset() {
        let (store, _) = store();

        store.observe("a", 5, WINDOW);
        store.observe("b", 5, WINDOW);
        assert!(store.reset("a"));
        assert!(!store.reset("a"));
        assert_eq!(store.observe("a", 5, WINDOW).count, 1);

        store.reset_all();
        assert_eq!(store.stats().size, 0);
    }
}
