//! Named Cache Module
//!
//! Thread-safe wrapper giving a [`TtlCache`] a name and a single lock.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheStats, TtlCache};
use crate::clock::SharedClock;
use crate::error::Result;
use crate::tasks::Sweep;

// == Named Cache ==
/// A [`TtlCache`] behind a mutex.
///
/// Every operation, including the background sweep, takes the same lock and
/// never holds it across an await point.
#[derive(Debug)]
pub struct NamedCache<V> {
    name: String,
    store: Mutex<TtlCache<V>>,
}

impl<V: Clone> NamedCache<V> {
    pub fn new(
        name: impl Into<String>,
        max_entries: usize,
        default_ttl: Duration,
        clock: SharedClock,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            store: Mutex::new(TtlCache::new(max_entries, default_ttl, clock)?),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.store.lock().get(key)
    }

    /// Reads without touching hit/miss counters.
    pub fn peek(&self, key: &str) -> Option<V> {
        self.store.lock().peek(key)
    }

    pub fn has(&self, key: &str) -> bool {
        self.store.lock().has(key)
    }

    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let evicted = self.store.lock().set(key.into(), value, ttl);
        if let Some(evicted) = evicted {
            debug!(cache = %self.name, key = %evicted, "Capacity eviction");
        }
    }

    pub fn delete(&self, key: &str) -> bool {
        self.store.lock().delete(key)
    }

    pub fn clear(&self) {
        self.store.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        self.store.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }

    /// Runs `f` with exclusive access to the underlying store.
    ///
    /// Used for read-modify-write sequences that must not interleave with
    /// other callers.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut TtlCache<V>) -> R) -> R {
        f(&mut self.store.lock())
    }
}

impl<V: Clone + Send> Sweep for NamedCache<V> {
    fn label(&self) -> &str {
        &self.name
    }

    fn sweep(&self) -> usize {
        self.store.lock().purge_expired()
    }
}
