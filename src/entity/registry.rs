//! Named collection of entity caches.
//!
//! Entity caches hold different value types, so the registry stores them
//! behind the object-safe [`CacheAdmin`] trait and only exposes the
//! administrative surface: invalidation, clearing and stats.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::EntityCacheStats;
use crate::entity::EntityCache;

// == Cache Admin ==
/// Administrative view of an entity cache, independent of its value type.
pub trait CacheAdmin: Send + Sync {
    /// Removes one entity and detaches its in-flight load.
    fn invalidate(&self, id: i64);

    /// Invalidates each id in turn.
    fn invalidate_many(&self, ids: &[i64]) {
        for &id in ids {
            self.invalidate(id);
        }
    }

    /// Removes every cached entity.
    fn clear(&self);

    /// Snapshot of hit, miss and load counters.
    fn stats(&self) -> EntityCacheStats;

    /// Zeroes the counters.
    fn reset_stats(&self);

    /// Number of cached entities.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V> CacheAdmin for EntityCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn invalidate(&self, id: i64) {
        EntityCache::invalidate(self, id);
    }

    fn invalidate_many(&self, ids: &[i64]) {
        EntityCache::invalidate_many(self, ids);
    }

    fn clear(&self) {
        EntityCache::clear(self);
    }

    fn stats(&self) -> EntityCacheStats {
        EntityCache::stats(self)
    }

    fn reset_stats(&self) {
        EntityCache::reset_stats(self);
    }

    fn len(&self) -> usize {
        EntityCache::len(self)
    }
}

// == Cache Registry ==
/// Entity caches of one store, keyed by entity name.
#[derive(Default)]
pub struct CacheRegistry {
    caches: BTreeMap<String, Arc<dyn CacheAdmin>>,
}

impl CacheRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // == Register ==
    /// Registers a cache under `name`, replacing any previous one.
    ///
    /// The registry keeps a handle to the same cache, so entries loaded
    /// through the caller's clone are visible to registry operations.
    pub fn register<V>(&mut self, name: impl Into<String>, cache: &EntityCache<V>)
    where
        V: Clone + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(name = %name, "registering entity cache");
        self.caches.insert(name, Arc::new(cache.clone()));
    }

    /// Returns the cache registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn CacheAdmin>> {
        self.caches.get(name).cloned()
    }

    // == Invalidation ==
    /// Invalidates one entity. Returns false when no cache has that name.
    pub fn invalidate(&self, name: &str, id: i64) -> bool {
        match self.caches.get(name) {
            Some(cache) => {
                cache.invalidate(id);
                true
            }
            None => false,
        }
    }

    /// Invalidates several entities of one cache. Returns false when no
    /// cache has that name.
    pub fn invalidate_many(&self, name: &str, ids: &[i64]) -> bool {
        match self.caches.get(name) {
            Some(cache) => {
                cache.invalidate_many(ids);
                true
            }
            None => false,
        }
    }

    /// Empties every registered cache.
    pub fn clear_all(&self) {
        for cache in self.caches.values() {
            cache.clear();
        }
        info!("cleared {} entity caches", self.caches.len());
    }

    // == Stats ==
    /// Counters of every registered cache, keyed by name.
    pub fn stats(&self) -> BTreeMap<String, EntityCacheStats> {
        self.caches
            .iter()
            .map(|(name, cache)| (name.clone(), cache.stats()))
            .collect()
    }

    /// Zeroes the counters of every registered cache.
    pub fn reset_stats(&self) {
        for cache in self.caches.values() {
            cache.reset_stats();
        }
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.caches.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}
