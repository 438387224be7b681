//! Cache Module
//!
//! Provides the size-bounded in-memory cache with TTL expiration and LRU eviction.

mod entry;
mod lru;
mod size;
mod stats;
mod store;


// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use lru::LruTracker;
pub use size::EstimateSize;
pub use stats::CacheStats;
pub use store::{BoundedCache, EvictCallback};

// == Public Constants ==
/// Default size budget: 100 MiB
pub const DEFAULT_MAX_SIZE: usize = 100 * 1024 * 1024;

/// Default time to live: 5 minutes
pub const DEFAULT_TTL_MS: u64 = 300_000;
