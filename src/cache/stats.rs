//! Cache Statistics Module
//!
//! Snapshot types for recency caches and load counters for entity caches.

use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;

// == LRU Stats ==
/// Point-in-time shape of a [`RecencyCache`](crate::cache::RecencyCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LruStats {
    /// Maximum number of entries
    pub capacity: usize,
    /// Entries currently indexed, including expired ones not yet purged
    pub size: usize,
    /// Entry time-to-live, None = no expiry
    pub ttl: Option<Duration>,
}

// == Entity Cache Stats ==
/// Load counters of one entity cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that fell through to a load
    pub misses: u64,
    /// Flights started (one per deduplicated miss)
    pub loads: u64,
    /// Loader invocations that returned an error
    pub load_errors: u64,
}

impl EntityCacheStats {
    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

// == Stats Recorder ==
/// Counter holder owned by a single entity cache.
///
/// Guarded by its own lock so counter updates never contend with the
/// recency cache's lock.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    stats: RwLock<EntityCacheStats>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.stats.write().hits += 1;
    }

    pub fn record_miss(&self) {
        self.stats.write().misses += 1;
    }

    pub fn record_load(&self) {
        self.stats.write().loads += 1;
    }

    pub fn record_load_error(&self) {
        self.stats.write().load_errors += 1;
    }

    /// Returns a copy of the current counters.
    pub fn snapshot(&self) -> EntityCacheStats {
        *self.stats.read()
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        *self.stats.write() = EntityCacheStats::default();
    }

    pub fn hit_rate(&self) -> f64 {
        self.stats.read().hit_rate()
    }
}
