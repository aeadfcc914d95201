//! Cache Module
//!
//! Provides in-memory recency caching with lazy TTL expiration and LRU eviction.

mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use stats::{EntityCacheStats, LruStats, StatsRecorder};
pub use store::{LruConfig, RecencyCache};

// == Public Constants ==
/// Capacity used when a cache is configured with zero capacity
pub const DEFAULT_CAPACITY: usize = 1000;
