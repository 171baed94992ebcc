//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support.

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
///
/// All timestamps are Unix milliseconds taken from the owning cache's clock.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Creation timestamp
    pub created_at: u64,
    /// Expiration timestamp; the entry is absent once `now >= expires_at`
    pub expires_at: u64,
    /// Last time a read (`get` or positive `has`) touched this entry
    pub last_accessed_at: u64,
    /// Position in the owning cache's recency order
    pub(crate) access_seq: u64,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new entry living for `ttl_ms` milliseconds from `now`.
    pub fn new(value: V, now: u64, ttl_ms: u64, access_seq: u64) -> Self {
        Self {
            value,
            created_at: now,
            expires_at: now.saturating_add(ttl_ms),
            last_accessed_at: now,
            access_seq,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired at `now`.
    ///
    /// Boundary condition: an entry is expired when `now` is greater than or
    /// equal to the expiration time, so it disappears as soon as the full TTL
    /// has elapsed.
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Returns remaining TTL in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }
}
