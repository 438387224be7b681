//! Cache Tier Trait
//!
//! The minimal async contract shared by every cache level, so tiers can be
//! composed by [`MultiTierCache`](crate::strategies::MultiTierCache).

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::cache::BoundedCache;
use crate::keys::glob_to_regex;

/// One level of a composed cache.
///
/// Implementations never fail: an unavailable tier behaves like an empty one.
#[async_trait]
pub trait CacheTier: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    async fn delete(&self, key: &str) -> bool;

    /// Removes every key matching any of the glob patterns.
    async fn invalidate(&self, patterns: &[String]);
}

#[async_trait]
impl CacheTier for BoundedCache<Value> {
    async fn get(&self, key: &str) -> Option<Value> {
        BoundedCache::get(self, key)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        BoundedCache::set(self, key, value, ttl);
    }

    async fn delete(&self, key: &str) -> bool {
        BoundedCache::delete(self, key)
    }

    async fn invalidate(&self, patterns: &[String]) {
        for pattern in patterns {
            match glob_to_regex(pattern) {
                Ok(matcher) => {
                    self.delete_matching(&matcher);
                }
                Err(e) => warn!("Skipping invalid pattern '{}': {}", pattern, e),
            }
        }
    }
}
