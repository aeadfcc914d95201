//! Entity Cache Module
//!
//! Recency cache in front of an async per-id loader, with concurrent misses
//! for the same id collapsed into one load.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::{
    EntityCacheStats, LruConfig, LruStats, RecencyCache, StatsRecorder, DEFAULT_CAPACITY,
};
use crate::entity::SingleFlight;
use crate::error::{BoxError, CacheError, Result};

/// Key prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "entity";

type LoadFn<V> = Box<
    dyn Fn(CancellationToken, i64) -> BoxFuture<'static, std::result::Result<V, BoxError>>
        + Send
        + Sync,
>;

// == Entity Cache Config ==
/// Configuration for one [`EntityCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCacheConfig {
    /// Maximum number of cached entities, 0 = [`DEFAULT_CAPACITY`]
    pub capacity: usize,
    /// Entity time-to-live, None = no expiry
    pub ttl: Option<Duration>,
    /// Prefix of single-flight fingerprints, empty = [`DEFAULT_KEY_PREFIX`]
    pub key_prefix: String,
}

impl Default for EntityCacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            ttl: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

// == Get Many Error ==
/// Failure of [`EntityCache::get_many`].
///
/// `partial[i]` corresponds to `ids[i]`. A slot is `None` when its load
/// failed, and also when its load succeeded only after the first error had
/// already been recorded: those late successes are dropped.
pub struct GetManyError<V> {
    pub partial: Vec<Option<V>>,
    /// First error in arrival order
    pub source: CacheError,
}

impl<V> fmt::Debug for GetManyError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetManyError")
            .field("loaded", &self.partial.iter().filter(|v| v.is_some()).count())
            .field("requested", &self.partial.len())
            .field("source", &self.source)
            .finish()
    }
}

impl<V> fmt::Display for GetManyError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch load failed: {}", self.source)
    }
}

impl<V> std::error::Error for GetManyError<V> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<V> From<GetManyError<V>> for CacheError {
    fn from(err: GetManyError<V>) -> Self {
        err.source
    }
}

struct Inner<V> {
    lru: RecencyCache<i64, V>,
    flights: Arc<SingleFlight<V>>,
    loader: LoadFn<V>,
    key_prefix: String,
    stats: StatsRecorder,
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn flight_key(&self, id: i64) -> String {
        format!("{}:{}", self.key_prefix, id)
    }

    /// Body of one flight; runs at most once at a time per id.
    async fn load(&self, ctx: CancellationToken, id: i64, key: String) -> Result<V> {
        self.stats.record_load();

        // Another flight may have filled the slot while this caller queued
        if let Some(value) = self.lru.get(&id) {
            return Ok(value);
        }

        debug!(key = %key, "loading entity");
        match (self.loader)(ctx, id).await {
            Ok(value) => {
                self.lru.set(id, value.clone());
                Ok(value)
            }
            Err(err) => {
                self.stats.record_load_error();
                warn!(key = %key, error = %err, "entity load failed");
                Err(CacheError::load(key, err))
            }
        }
    }
}

// == Entity Cache ==
/// Deduplicating cache for entities keyed by numeric id.
///
/// Cloning is cheap and every clone shares the same cache, flights and
/// counters.
pub struct EntityCache<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for EntityCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> fmt::Debug for EntityCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityCache")
            .field("key_prefix", &self.inner.key_prefix)
            .field("lru", &self.inner.lru)
            .field("stats", &self.inner.stats.snapshot())
            .finish()
    }
}

impl<V> EntityCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Creates an entity cache backed by `loader`.
    ///
    /// The loader must tolerate concurrent calls for different ids; for one
    /// id it is never called concurrently by this cache.
    pub fn new<F, Fut>(config: EntityCacheConfig, loader: F) -> Self
    where
        F: Fn(CancellationToken, i64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<V, BoxError>> + Send + 'static,
    {
        let key_prefix = if config.key_prefix.is_empty() {
            DEFAULT_KEY_PREFIX.to_string()
        } else {
            config.key_prefix
        };
        let loader: LoadFn<V> =
            Box::new(move |ctx: CancellationToken, id: i64| loader(ctx, id).boxed());

        Self {
            inner: Arc::new(Inner {
                lru: RecencyCache::with_config(LruConfig {
                    capacity: config.capacity,
                    ttl: config.ttl,
                }),
                flights: Arc::new(SingleFlight::new()),
                loader,
                key_prefix,
                stats: StatsRecorder::new(),
            }),
        }
    }

    // == Get ==
    /// Returns the entity, loading it on a miss.
    ///
    /// Concurrent misses for the same id share one load and all receive
    /// its value or its error. Errors are never cached. The load runs with
    /// the context of the caller that started it.
    pub async fn get(&self, ctx: &CancellationToken, id: i64) -> Result<V> {
        if let Some(value) = self.inner.lru.get(&id) {
            self.inner.stats.record_hit();
            return Ok(value);
        }
        self.inner.stats.record_miss();

        let key = self.inner.flight_key(id);
        let inner = Arc::clone(&self.inner);
        let ctx = ctx.clone();
        let flight_key = key.clone();
        self.inner
            .flights
            .run(&key, move || async move { inner.load(ctx, id, flight_key).await })
            .await
    }

    // == Get Many ==
    /// Loads every id concurrently, one task per id.
    ///
    /// On success `values[i]` corresponds to `ids[i]`. On failure the error
    /// carries the first error in arrival order plus whatever had loaded
    /// before it; which sibling slots are filled depends on completion order.
    pub async fn get_many(
        &self,
        ctx: &CancellationToken,
        ids: &[i64],
    ) -> std::result::Result<Vec<V>, GetManyError<V>> {
        let mut tasks = JoinSet::new();
        for (index, &id) in ids.iter().enumerate() {
            let cache = self.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move { (index, cache.get(&ctx, id).await) });
        }

        let mut values: Vec<Option<V>> = vec![None; ids.len()];
        let mut first_error: Option<CacheError> = None;

        while let Some(joined) = tasks.join_next().await {
            let (index, result) = match joined {
                Ok(done) => done,
                Err(err) => {
                    first_error.get_or_insert(CacheError::TaskFailed(err.to_string()));
                    continue;
                }
            };
            match result {
                Ok(value) if first_error.is_none() => values[index] = Some(value),
                Ok(_) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            None => Ok(values.into_iter().flatten().collect()),
            Some(source) => {
                warn!(
                    prefix = %self.inner.key_prefix,
                    requested = ids.len(),
                    error = %source,
                    "batch entity load failed"
                );
                Err(GetManyError {
                    partial: values,
                    source,
                })
            }
        }
    }

    // == Administrative ==
    /// Stores a value directly, bypassing the loader.
    pub fn set(&self, id: i64, value: V) {
        self.inner.lru.set(id, value);
    }

    /// Returns a cached value without loading, counting or reordering.
    pub fn peek(&self, id: i64) -> Option<V> {
        self.inner.lru.peek(&id)
    }

    /// Removes an entity and discards any in-flight load for it, so the
    /// next `get` starts a fresh load.
    pub fn invalidate(&self, id: i64) {
        self.inner.lru.delete(&id);
        self.inner.flights.forget(&self.inner.flight_key(id));
    }

    /// Invalidates each id in turn.
    pub fn invalidate_many(&self, ids: &[i64]) {
        for &id in ids {
            self.invalidate(id);
        }
    }

    /// Removes every cached entity.
    pub fn clear(&self) {
        self.inner.lru.clear();
    }

    /// Number of cached entities, expired ones included.
    pub fn len(&self) -> usize {
        self.inner.lru.len()
    }

    /// Returns true when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.inner.lru.is_empty()
    }

    /// Prefix of this cache's single-flight keys.
    pub fn key_prefix(&self) -> &str {
        &self.inner.key_prefix
    }

    // == Stats ==
    pub fn stats(&self) -> EntityCacheStats {
        self.inner.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.inner.stats.reset();
    }

    /// hits / (hits + misses), 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        self.inner.stats.hit_rate()
    }

    /// Capacity, size and TTL of the underlying recency cache.
    pub fn lru_stats(&self) -> LruStats {
        self.inner.lru.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_cache(
        config: EntityCacheConfig,
        calls: Arc<AtomicUsize>,
    ) -> EntityCache<i64> {
        EntityCache::new(config, move |_ctx, id| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                if id < 0 {
                    Err(BoxError::from(format!("no entity {}", id)))
                } else {
                    Ok(id * 2)
                }
            }
        })
    }

    #[tokio::test]
    async fn test_get_loads_then_hits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(EntityCacheConfig::default(), Arc::clone(&calls));
        let ctx = CancellationToken::new();

        assert_eq!(cache.get(&ctx, 5).await.unwrap(), 10);
        assert_eq!(cache.get(&ctx, 5).await.unwrap(), 10);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.load_errors, 0);
        assert_eq!(cache.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn test_load_errors_are_not_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(EntityCacheConfig::default(), Arc::clone(&calls));
        let ctx = CancellationToken::new();

        let err = cache.get(&ctx, -1).await.unwrap_err();
        assert!(matches!(err, CacheError::Load { ref key, .. } if key == "entity:-1"));
        assert!(err.to_string().contains("no entity -1"));

        assert!(cache.get(&ctx, -1).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2, "every call retries the load");
        assert_eq!(cache.stats().load_errors, 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_defaults_applied() {
        let cache = counting_cache(
            EntityCacheConfig {
                capacity: 0,
                ttl: None,
                key_prefix: String::new(),
            },
            Arc::new(AtomicUsize::new(0)),
        );

        assert_eq!(cache.key_prefix(), DEFAULT_KEY_PREFIX);
        assert_eq!(cache.lru_stats().capacity, DEFAULT_CAPACITY);
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_set_and_invalidate() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(EntityCacheConfig::default(), Arc::clone(&calls));
        let ctx = CancellationToken::new();

        cache.set(3, 100);
        assert_eq!(cache.get(&ctx, 3).await.unwrap(), 100);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cache.invalidate(3);
        assert_eq!(cache.peek(3), None);
        assert_eq!(cache.get(&ctx, 3).await.unwrap(), 6);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cache.set(4, 1);
        cache.set(5, 1);
        cache.invalidate_many(&[3, 4]);
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_invalidate_detaches_in_flight_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cache = EntityCache::new(EntityCacheConfig::default(), move |_ctx, _id| {
            let call = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
                Ok::<_, BoxError>(100 + call as i64)
            }
        });
        let ctx = CancellationToken::new();

        let stale = {
            let (cache, ctx) = (cache.clone(), ctx.clone());
            tokio::spawn(async move { cache.get(&ctx, 1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.inner.flights.in_flight("entity:1"));

        cache.invalidate(1);
        assert!(!cache.inner.flights.in_flight("entity:1"));

        assert_eq!(cache.get(&ctx, 1).await.unwrap(), 101);
        assert_eq!(stale.await.unwrap().unwrap(), 100);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        // The detached load still stores its value when it lands
        assert_eq!(cache.peek(1), Some(100));
    }

    #[tokio::test]
    async fn test_reset_stats() {
        let cache = counting_cache(EntityCacheConfig::default(), Arc::new(AtomicUsize::new(0)));
        let ctx = CancellationToken::new();

        cache.get(&ctx, 1).await.unwrap();
        cache.get(&ctx, 1).await.unwrap();
        cache.reset_stats();

        assert_eq!(cache.stats(), EntityCacheStats::default());
        assert_eq!(cache.hit_rate(), 0.0);
    }

    #[tokio::test]
    async fn test_ttl_expiry_reloads() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = counting_cache(
            EntityCacheConfig {
                ttl: Some(Duration::from_millis(30)),
                ..EntityCacheConfig::default()
            },
            Arc::clone(&calls),
        );
        let ctx = CancellationToken::new();

        cache.get(&ctx, 1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache.get(&ctx, 1).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_get_many_in_order() {
        let cache = counting_cache(EntityCacheConfig::default(), Arc::new(AtomicUsize::new(0)));
        let ctx = CancellationToken::new();

        let values = cache.get_many(&ctx, &[3, 1, 2]).await.unwrap();
        assert_eq!(values, vec![6, 2, 4]);

        let empty = cache.get_many(&ctx, &[]).await.unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_get_many_error_converts_to_cache_error() {
        let cache = counting_cache(EntityCacheConfig::default(), Arc::new(AtomicUsize::new(0)));
        let ctx = CancellationToken::new();

        let err = cache.get_many(&ctx, &[1, -2]).await.unwrap_err();
        assert_eq!(err.partial.len(), 2);
        assert_eq!(err.partial[1], None);
        assert!(err.to_string().starts_with("batch load failed"));

        let cache_err: CacheError = err.into();
        assert!(matches!(cache_err, CacheError::Load { .. }));
    }
}
