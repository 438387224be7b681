//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL and size accounting.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

// == Cache Entry ==
/// Represents a single cache entry with value and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Expiration time, the entry is invisible from this instant on
    pub expires_at: Instant,
    /// Estimated size in bytes, charged against the cache budget
    pub size: usize,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates a new cache entry expiring `ttl` from now.
    ///
    /// # Arguments
    /// * `value` - The value to store
    /// * `ttl` - Time to live
    /// * `size` - Estimated size of `value` in bytes
    pub fn new(value: V, ttl: Duration, size: usize) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
            size,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time is greater than or equal to
    /// the expiration time.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
///
/// Used for metadata that leaves the process (remote envelopes, HTTP records),
/// where a monotonic instant has no meaning.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
