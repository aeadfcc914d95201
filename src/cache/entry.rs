//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

use std::time::{Duration, Instant};

// == Cache Entry ==
/// Represents a single cache entry with value and expiry.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Expiration instant, None = no expiration
    pub expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` from now, if a TTL is given.
    ///
    /// A TTL too large to represent as an instant means no expiration.
    pub fn new(value: V, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: expiry_from_now(ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once the current time is
    /// greater than or equal to the expiration instant.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Expiry check against a caller-supplied clock reading.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        match self.expires_at {
            Some(expires) => now >= expires,
            None => false,
        }
    }

    // == Refresh ==
    /// Replaces the value and restarts the TTL window.
    pub fn refresh(&mut self, value: V, ttl: Option<Duration>) {
        self.value = value;
        self.expires_at = expiry_from_now(ttl);
    }
}

fn expiry_from_now(ttl: Option<Duration>) -> Option<Instant> {
    ttl.and_then(|ttl| Instant::now().checked_add(ttl))
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation_no_ttl() {
        let entry = CacheEntry::new("test_value", None);

        assert_eq!(entry.value, "test_value");
        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new(7, Some(Duration::from_secs(60)));

        let expires = entry.expires_at.unwrap();
        assert!(!entry.is_expired());
        assert!(expires <= Instant::now() + Duration::from_secs(60));
        assert!(entry.is_expired_at(expires + Duration::from_secs(1)));
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let huge = Some(Duration::from_secs(u64::MAX));
        let mut entry = CacheEntry::new(1, huge);

        assert!(entry.expires_at.is_none());
        assert!(!entry.is_expired());

        entry.refresh(2, huge);
        assert_eq!(entry.value, 2);
        assert!(entry.expires_at.is_none());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new(1, Some(Duration::from_millis(20)));
        assert!(!entry.is_expired());

        sleep(Duration::from_millis(30));

        assert!(entry.is_expired());
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = Instant::now();
        let entry = CacheEntry {
            value: 1,
            expires_at: Some(now),
        };

        assert!(entry.is_expired_at(now), "Entry should be expired at boundary");
    }

    #[test]
    fn test_refresh_resets_value_and_expiry() {
        let mut entry = CacheEntry::new(1, Some(Duration::from_millis(10)));
        sleep(Duration::from_millis(15));
        assert!(entry.is_expired());

        entry.refresh(2, Some(Duration::from_secs(60)));
        assert_eq!(entry.value, 2);
        assert!(!entry.is_expired());

        entry.refresh(3, None);
        assert!(entry.expires_at.is_none());
    }
}
