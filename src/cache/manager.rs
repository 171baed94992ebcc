//! Cache Manager Module
//!
//! One [`NamedCache`] per [`Category`], composite key derivation, fan-out
//! population and read-through computation.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::cache::fanout::{entity_id, extract_sub_entities, Contents};
use crate::cache::{cache_key, CacheStats, Category, NamedCache, Params, Payload};
use crate::clock::SharedClock;
use crate::config::CacheConfig;
use crate::error::Result;
use crate::tasks::Sweep;

// == Compute Mode ==
/// How concurrent misses on the same key are handled by `get_or_compute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComputeMode {
    /// Every missing caller runs its own computation.
    Independent,
    /// One computation per key at a time; waiters re-check the cache first.
    #[default]
    SingleFlight,
}

// == Cache Manager ==
#[derive(Debug)]
pub struct CacheManager {
    /// Indexed by `Category::index`
    caches: Vec<Arc<NamedCache<Payload>>>,
    mode: ComputeMode,
    flights: InFlight,
}

impl CacheManager {
    // == Constructor ==
    /// Creates one cache per category with the category's default TTL.
    pub fn new(config: &CacheConfig, clock: SharedClock) -> Result<Self> {
        let caches = Category::ALL
            .into_iter()
            .map(|category| {
                NamedCache::new(
                    category.as_str(),
                    config.max_entries,
                    category.default_ttl(),
                    Arc::clone(&clock),
                )
                .map(Arc::new)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            caches,
            mode: config.compute_mode,
            flights: InFlight::default(),
        })
    }

    pub fn mode(&self) -> ComputeMode {
        self.mode
    }

    /// The named cache backing `category`.
    pub fn cache(&self, category: Category) -> &Arc<NamedCache<Payload>> {
        &self.caches[category.index()]
    }

    /// Key under which `category`/`id`/`params` is stored.
    pub fn key_for(category: Category, id: &str, params: &Params) -> String {
        cache_key(category.key_prefix(), id, params)
    }

    // == Get ==
    pub fn get(&self, category: Category, id: &str, params: &Params) -> Option<Payload> {
        self.cache(category).get(&Self::key_for(category, id, params))
    }

    // == Put ==
    /// Stores `value` and any sub-entities it embeds.
    ///
    /// The payload is assumed to hold what `category` usually holds, see
    /// [`Contents::of`]. Returns the number of sub-entities stored.
    pub fn put(
        &self,
        category: Category,
        id: &str,
        params: &Params,
        value: Payload,
        ttl: Option<Duration>,
    ) -> usize {
        self.put_as(category, Contents::of(category), id, params, value, ttl)
    }

    /// Stores `value`, fanning out the sub-entities `contents` describes.
    ///
    /// Malformed sub-entities are logged and skipped.
    pub fn put_as(
        &self,
        category: Category,
        contents: Contents,
        id: &str,
        params: &Params,
        value: Payload,
        ttl: Option<Duration>,
    ) -> usize {
        let sub_entities = extract_sub_entities(contents, &value);
        self.cache(category)
            .set(Self::key_for(category, id, params), value, ttl);

        let mut stored = 0;
        for found in sub_entities {
            match found {
                Ok(sub) => {
                    let key = Self::key_for(sub.category, &sub.id, &Params::new());
                    self.cache(sub.category).set(key, sub.value, None);
                    stored += 1;
                }
                Err(err) => {
                    warn!(category = %category, id, error = %err, "Skipping malformed sub-entity");
                }
            }
        }

        if stored > 0 {
            debug!(category = %category, id, stored, "Fan-out stored sub-entities");
        }
        stored
    }

    // == Get Or Compute ==
    /// Returns the cached value or runs `compute`, stores its result and returns it.
    ///
    /// A failed computation stores nothing and hands the error back.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        category: Category,
        id: &str,
        params: &Params,
        compute: F,
    ) -> std::result::Result<Payload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Payload, E>>,
    {
        self.get_or_compute_as(category, Contents::of(category), id, params, compute)
            .await
    }

    /// `get_or_compute` for a payload holding `contents`.
    ///
    /// Every call counts exactly one hit or one miss. In single-flight mode a
    /// caller served by the computation it waited on counts a hit.
    pub async fn get_or_compute_as<F, Fut, E>(
        &self,
        category: Category,
        contents: Contents,
        id: &str,
        params: &Params,
        compute: F,
    ) -> std::result::Result<Payload, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Payload, E>>,
    {
        let key = Self::key_for(category, id, params);
        let cache = self.cache(category);

        let _flight = match self.mode {
            ComputeMode::Independent => {
                if let Some(value) = cache.get(&key) {
                    return Ok(value);
                }
                None
            }
            ComputeMode::SingleFlight => {
                if let Some(value) = cache.with_store(|store| store.try_hit(&key)) {
                    return Ok(value);
                }
                let flight = self.flights.join(&key).await;
                // Filled by the caller we were queued behind
                if let Some(value) = cache.get(&key) {
                    return Ok(value);
                }
                Some(flight)
            }
        };

        let value = compute().await?;
        self.put_as(category, contents, id, params, value.clone(), None);
        Ok(value)
    }

    // == Warm ==
    /// Preloads JSON objects into `category`, keyed by their `id_field`.
    ///
    /// Users are keyed by name, so warm them with `id_field = "username"`.
    /// Items without a usable id are skipped. Returns how many were stored.
    pub fn warm(&self, category: Category, items: &[Value], id_field: &str) -> usize {
        let cache = self.cache(category);
        let mut stored = 0;
        for item in items {
            let Some(id) = item.get(id_field).and_then(|raw| entity_id(category, raw).ok()) else {
                continue;
            };
            cache.set(Self::key_for(category, &id, &Params::new()), Payload::Json(item.clone()), None);
            stored += 1;
        }
        info!(category = %category, stored, "Warmed up cache");
        stored
    }

    // == Stats ==
    pub fn stats_all(&self) -> BTreeMap<Category, CacheStats> {
        Category::ALL
            .into_iter()
            .map(|category| (category, self.cache(category).stats()))
            .collect()
    }

    // == Invalidate ==
    pub fn invalidate(&self, category: Category) {
        self.cache(category).clear();
        info!(category = %category, "Cache invalidated");
    }

    pub fn invalidate_all(&self) {
        for cache in &self.caches {
            cache.clear();
        }
        info!("All caches invalidated");
    }

    /// Caches to hand to the background sweeper.
    pub fn sweep_targets(&self) -> Vec<Arc<dyn Sweep>> {
        self.caches
            .iter()
            .map(|cache| Arc::clone(cache) as Arc<dyn Sweep>)
            .collect()
    }
}

// == In-Flight Computations ==
/// Per-key async gates used in `ComputeMode::SingleFlight`.
#[derive(Debug, Default)]
struct InFlight {
    gates: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl InFlight {
    async fn join(&self, key: &str) -> FlightGuard<'_> {
        let gate = {
            let mut gates = self.gates.lock();
            Arc::clone(
                gates
                    .entry(key.to_string())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };
        let permit = Arc::clone(&gate).lock_owned().await;
        FlightGuard {
            flights: self,
            key: key.to_string(),
            gate,
            permit: Some(permit),
        }
    }
}

/// Holds a key's gate; the gate is dropped from the map with its last holder.
struct FlightGuard<'a> {
    flights: &'a InFlight,
    key: String,
    gate: Arc<AsyncMutex<()>>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.permit.take();
        let mut gates = self.flights.gates.lock();
        // Only the map and this guard still reference the gate
        if Arc::strong_count(&self.gate) == 2 {
            gates.remove(&self.key);
        }
    }
}
