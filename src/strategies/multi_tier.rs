//! Multi-tier cascade
//!
//! An ordered list of tiers, fastest first. Reads walk the list and copy a
//! hit into every faster tier; writes and invalidations go to all tiers
//! concurrently.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::CacheStrategy;
use crate::error::{CacheError, Result};
use crate::tier::CacheTier;

/// One level of the cascade.
#[derive(Clone)]
pub struct Tier {
    pub name: String,
    pub cache: Arc<dyn CacheTier>,
    /// TTL used when this tier is written; the tier's own default when unset.
    pub ttl: Option<Duration>,
}

impl Tier {
    pub fn new(name: impl Into<String>, cache: Arc<dyn CacheTier>) -> Self {
        Self {
            name: name.into(),
            cache,
            ttl: None,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// Hits served by one tier.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierStats {
    pub name: String,
    pub hits: u64,
}

pub struct MultiTierCache {
    tiers: Vec<Tier>,
    hits: Vec<AtomicU64>,
    misses: AtomicU64,
}

impl MultiTierCache {
    pub fn new(tiers: Vec<Tier>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(CacheError::Configuration(
                "MultiTierCache requires at least one tier".to_string(),
            ));
        }

        let hits = tiers.iter().map(|_| AtomicU64::new(0)).collect();
        Ok(Self {
            tiers,
            hits,
            misses: AtomicU64::new(0),
        })
    }

    pub fn tier_stats(&self) -> Vec<TierStats> {
        self.tiers
            .iter()
            .zip(&self.hits)
            .map(|(tier, hits)| TierStats {
                name: tier.name.clone(),
                hits: hits.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Reads that missed every tier.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl CacheStrategy for MultiTierCache {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        for (level, tier) in self.tiers.iter().enumerate() {
            let Some(value) = tier.cache.get(key).await else {
                continue;
            };

            self.hits[level].fetch_add(1, Ordering::Relaxed);
            if level > 0 {
                debug!("'{}' found in tier '{}', promoting", key, tier.name);
                join_all(
                    self.tiers[..level]
                        .iter()
                        .map(|faster| faster.cache.set(key, value.clone(), faster.ttl)),
                )
                .await;
            }
            return Ok(Some(value));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    /// An explicit TTL overrides every tier's own.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        join_all(
            self.tiers
                .iter()
                .map(|tier| tier.cache.set(key, value.clone(), ttl.or(tier.ttl))),
        )
        .await;
        Ok(())
    }

    async fn invalidate(&self, patterns: &[String]) {
        join_all(self.tiers.iter().map(|tier| tier.cache.invalidate(patterns))).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BoundedCache;
    use serde_json::json;

    fn levels() -> (Vec<Arc<BoundedCache<Value>>>, MultiTierCache) {
        let caches: Vec<Arc<BoundedCache<Value>>> = (0..3)
            .map(|_| Arc::new(BoundedCache::new(1024 * 1024, Duration::from_secs(60))))
            .collect();
        let tiers = caches
            .iter()
            .enumerate()
            .map(|(i, cache)| Tier::new(format!("L{}", i + 1), cache.clone() as Arc<dyn CacheTier>))
            .collect();
        (caches, MultiTierCache::new(tiers).unwrap())
    }

    #[test]
    fn test_requires_a_tier() {
        assert!(matches!(
            MultiTierCache::new(Vec::new()),
            Err(CacheError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_hit_promotes_to_faster_tiers_only() {
        let (caches, cascade) = levels();
        caches[1].set("k", json!("v"), None);

        assert_eq!(cascade.get("k").await.unwrap(), Some(json!("v")));
        assert!(caches[0].has("k"));
        assert!(!caches[2].has("k"));

        assert_eq!(cascade.get("k").await.unwrap(), Some(json!("v")));
        let hits: Vec<u64> = cascade.tier_stats().iter().map(|s| s.hits).collect();
        assert_eq!(hits, vec![1, 1, 0]);
    }

    #[tokio::test]
    async fn test_miss_everywhere() {
        let (_, cascade) = levels();
        assert_eq!(cascade.get("absent").await.unwrap(), None);
        assert_eq!(cascade.misses(), 1);
    }

    #[tokio::test]
    async fn test_set_and_invalidate_reach_all_tiers() {
        let (caches, cascade) = levels();

        cascade.set("user:1", json!(1), None).await.unwrap();
        cascade.set("post:1", json!(2), None).await.unwrap();
        assert!(caches.iter().all(|c| c.has("user:1")));

        cascade.invalidate(&["user:*".to_string()]).await;
        assert!(caches.iter().all(|c| !c.has("user:1")));
        assert!(caches.iter().all(|c| c.has("post:1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_per_tier_ttl() {
        let fast: Arc<BoundedCache<Value>> =
            Arc::new(BoundedCache::new(1024, Duration::from_secs(60)));
        let slow: Arc<BoundedCache<Value>> =
            Arc::new(BoundedCache::new(1024, Duration::from_secs(60)));
        let cascade = MultiTierCache::new(vec![
            Tier::new("fast", fast.clone() as Arc<dyn CacheTier>).with_ttl(Duration::from_secs(1)),
            Tier::new("slow", slow.clone() as Arc<dyn CacheTier>),
        ])
        .unwrap();

        cascade.set("k", json!("v"), None).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!fast.has("k"));
        assert!(slow.has("k"));
        assert_eq!(cascade.get("k").await.unwrap(), Some(json!("v")));
        assert!(fast.has("k"));
    }
}
