//! Error types for the entity cache
//!
//! Provides unified error handling using thiserror.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by entity loaders.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Shared form of a loader error, handed to every waiter of a flight.
pub type SharedError = Arc<dyn StdError + Send + Sync + 'static>;

// == Cache Error Enum ==
/// Unified error type for the cache and runner layers.
///
/// Cloneable so a single failed load can be fanned out to every caller
/// that joined the same in-flight request.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The entity loader failed; never cached
    #[error("load failed for {key}: {source}")]
    Load {
        key: String,
        #[source]
        source: SharedError,
    },

    /// A shared cancellation scope fired before the work completed
    #[error("operation cancelled")]
    Cancelled,

    /// A spawned unit panicked or was aborted
    #[error("worker task failed: {0}")]
    TaskFailed(String),

    /// An environment variable was set but could not be parsed
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl CacheError {
    /// Wraps a loader error for the given flight key.
    pub fn load(key: impl Into<String>, source: BoxError) -> Self {
        CacheError::Load {
            key: key.into(),
            source: Arc::from(source),
        }
    }

    /// Returns true for [`CacheError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CacheError::Cancelled)
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display_includes_key_and_source() {
        let err = CacheError::load("scene:7", "connection reset".into());
        let msg = err.to_string();
        assert!(msg.contains("scene:7"));
        assert!(msg.contains("connection reset"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_cloned_load_error_shares_source() {
        let err = CacheError::load("tag:1", "boom".into());
        let cloned = err.clone();
        match (&err, &cloned) {
            (CacheError::Load { source: a, .. }, CacheError::Load { source: b, .. }) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => panic!("expected load errors"),
        }
    }

    #[test]
    fn test_is_cancelled() {
        assert!(CacheError::Cancelled.is_cancelled());
        assert!(!CacheError::TaskFailed("panic".to_string()).is_cancelled());
    }
}
