//! Entity Module
//!
//! Deduplicating per-entity caches built on the recency cache.

mod cache;
mod registry;
mod singleflight;

pub use cache::{EntityCache, EntityCacheConfig, GetManyError, DEFAULT_KEY_PREFIX};
pub use registry::{CacheAdmin, CacheRegistry};
pub use singleflight::SingleFlight;
