//! Recency Cache Module
//!
//! Thread-safe cache combining HashMap storage with LRU tracking and lazy TTL expiration.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::cache::{CacheEntry, LruStats, LruTracker, DEFAULT_CAPACITY};

/// Callback fired with the final key and value of every removed entry.
type EvictFn<K, V> = Box<dyn Fn(K, V) + Send + Sync>;

// == LRU Config ==
/// Configuration options for a [`RecencyCache`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LruConfig {
    /// Maximum number of entries, 0 = [`DEFAULT_CAPACITY`]
    pub capacity: usize,
    /// Entry time-to-live, None or zero = no expiration
    pub ttl: Option<Duration>,
}

struct Slot<V> {
    entry: CacheEntry<V>,
    /// Handle into the recency tracker
    node: usize,
}

struct Inner<K, V> {
    entries: HashMap<K, Slot<V>>,
    order: LruTracker<K>,
    on_evict: Option<EvictFn<K, V>>,
}

impl<K: Hash + Eq + Clone, V> Inner<K, V> {
    fn insert(&mut self, key: K, value: V, ttl: Option<Duration>) {
        if let Some(slot) = self.entries.get_mut(&key) {
            slot.entry.refresh(value, ttl);
            self.order.touch(slot.node);
            return;
        }

        let entry = CacheEntry::new(value, ttl);
        let node = self.order.push_front(key.clone());
        self.entries.insert(key, Slot { entry, node });
    }

    /// Evicts from the back until the size fits, returning how many went.
    fn evict_overflow(&mut self, capacity: usize) -> usize {
        let mut evicted = 0;
        while self.entries.len() > capacity {
            let Some(key) = self.order.pop_back() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&key) {
                self.notify(key, slot.entry.value);
                evicted += 1;
            }
        }
        evicted
    }

    fn remove(&mut self, key: &K) -> bool {
        let Some(slot) = self.entries.remove(key) else {
            return false;
        };
        if let Some(key) = self.order.remove(slot.node) {
            self.notify(key, slot.entry.value);
        }
        true
    }

    fn notify(&self, key: K, value: V) {
        if let Some(on_evict) = &self.on_evict {
            on_evict(key, value);
        }
    }
}

// == Recency Cache ==
/// Thread-safe LRU cache with optional TTL.
///
/// One lock guards both the key index and the recency order. `get`, `set`
/// and the removal paths take it exclusively; `peek`, `contains`, `keys`,
/// `len` and `stats` share it and never reorder.
///
/// Expiry is lazy: an expired entry is reported as absent by every read,
/// but it is only removed (and the eviction callback fired) by `get` or
/// `get_or_set`.
pub struct RecencyCache<K, V> {
    inner: RwLock<Inner<K, V>>,
    capacity: usize,
    ttl: Option<Duration>,
}

impl<K, V> fmt::Debug for RecencyCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecencyCache")
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .field("len", &self.inner.read().entries.len())
            .finish()
    }
}

impl<K, V> RecencyCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    // == Constructor ==
    /// Creates a cache holding at most `capacity` entries without expiry.
    ///
    /// A capacity of 0 is coerced to [`DEFAULT_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        Self::with_config(LruConfig {
            capacity,
            ttl: None,
        })
    }

    /// Creates a cache from the given configuration.
    pub fn with_config(config: LruConfig) -> Self {
        let capacity = if config.capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            config.capacity
        };
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                order: LruTracker::new(),
                on_evict: None,
            }),
            capacity,
            ttl: config.ttl.filter(|ttl| !ttl.is_zero()),
        }
    }

    // == On Evict ==
    /// Installs the callback fired for each removed entry.
    ///
    /// The callback runs while the cache lock is held and must not call
    /// back into the same cache.
    pub fn set_on_evict<F>(&self, on_evict: F)
    where
        F: Fn(K, V) + Send + Sync + 'static,
    {
        self.inner.write().on_evict = Some(Box::new(on_evict));
    }

    // == Get ==
    /// Retrieves a value and marks it most recently used.
    ///
    /// An expired entry is removed (firing the eviction callback) and
    /// reported as absent.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write();

        let slot = inner.entries.get(key)?;
        if slot.entry.is_expired() {
            inner.remove(key);
            return None;
        }

        let (node, value) = (slot.node, slot.entry.value.clone());
        inner.order.touch(node);
        Some(value)
    }

    // == Peek ==
    /// Retrieves a value without updating its position in the LRU order.
    pub fn peek(&self, key: &K) -> Option<V> {
        let inner = self.inner.read();
        inner
            .entries
            .get(key)
            .filter(|slot| !slot.entry.is_expired())
            .map(|slot| slot.entry.value.clone())
    }

    // == Set ==
    /// Adds or updates a value, resetting its expiry and moving it to front.
    ///
    /// Capacity is enforced after insertion by evicting from the back.
    pub fn set(&self, key: K, value: V) {
        let mut inner = self.inner.write();
        inner.insert(key, value, self.ttl);
        let evicted = inner.evict_overflow(self.capacity);
        if evicted > 0 {
            debug!("recency cache evicted {} entries over capacity", evicted);
        }
    }

    // == Delete ==
    /// Removes a key, firing the eviction callback. Returns whether it existed.
    pub fn delete(&self, key: &K) -> bool {
        self.inner.write().remove(key)
    }

    // == Clear ==
    /// Removes every entry, firing the eviction callback once per entry.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        let entries = std::mem::take(&mut inner.entries);
        inner.order.clear();
        let count = entries.len();
        for (key, slot) in entries {
            inner.notify(key, slot.entry.value);
        }
        debug!("recency cache cleared {} entries", count);
    }

    // == Contains ==
    /// Checks for a live entry without touching the LRU order.
    pub fn contains(&self, key: &K) -> bool {
        self.inner
            .read()
            .entries
            .get(key)
            .is_some_and(|slot| !slot.entry.is_expired())
    }

    // == Keys ==
    /// Returns live keys, most recently used first.
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.read();
        let now = Instant::now();
        inner
            .order
            .iter()
            .filter(|key| {
                inner
                    .entries
                    .get(*key)
                    .is_some_and(|slot| !slot.entry.is_expired_at(now))
            })
            .cloned()
            .collect()
    }

    // == Get Or Set ==
    /// Returns the cached value, or computes, stores and returns a new one.
    ///
    /// The write lock is held while `compute` runs, so at most one compute
    /// executes per lock-holding interval. A failed compute caches nothing
    /// and its error is returned unchanged.
    pub fn get_or_set<E, F>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let mut inner = self.inner.write();

        // Double-check after acquiring the write lock
        if let Some(slot) = inner.entries.get(&key) {
            if !slot.entry.is_expired() {
                let (node, value) = (slot.node, slot.entry.value.clone());
                inner.order.touch(node);
                return Ok(value);
            }
            inner.remove(&key);
        }

        let value = compute()?;
        inner.insert(key, value.clone(), self.ttl);
        inner.evict_overflow(self.capacity);
        Ok(value)
    }

    // == Length ==
    /// Returns the number of indexed entries, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    /// Returns true when no entry is indexed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the entry time-to-live, None = no expiration.
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> LruStats {
        LruStats {
            capacity: self.capacity,
            size: self.len(),
            ttl: self.ttl,
        }
    }
}
