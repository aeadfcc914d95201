//! Entity Cache - in-process caching for per-entity lookups
//!
//! Provides a recency cache with optional TTL, a deduplicating entity cache
//! that collapses concurrent loads of the same id, and bounded-concurrency
//! runners used to fan those loads out.

pub mod cache;
pub mod config;
pub mod entity;
pub mod error;
pub mod pool;
pub mod runner;

pub use cache::{EntityCacheStats, LruConfig, LruStats, RecencyCache};
pub use config::CacheConfig;
pub use entity::{CacheAdmin, CacheRegistry, EntityCache, EntityCacheConfig, GetManyError};
pub use error::{BoxError, CacheError, Result};
pub use pool::VecPool;
pub use runner::{run_batches, run_batches_concurrent, run_parallel, run_parallel_map, WorkerPool};
