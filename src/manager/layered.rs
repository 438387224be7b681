//! Layered Cache Manager
//!
//! Composes a local [`BoundedCache`] with a shared remote tier into one
//! read-through, write-to-all cache.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::cache::{BoundedCache, CacheStats};
use crate::config::CacheConfig;
use crate::keys::{glob_to_regex, KeyGenerator};
use crate::remote::{RemoteStats, RemoteStore};
use crate::tier::CacheTier;

type InFlightMap = DashMap<String, Arc<Mutex<()>>>;

// == Manager Stats ==
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ManagerStats {
    pub local: Option<CacheStats>,
    pub remote: Option<RemoteStats>,
}

// == Cache Manager ==
/// One logical cache over a fast local layer and a shared remote layer.
///
/// Reads check local first and backfill it from remote hits. Writes go to
/// every enabled layer independently: there is no two-phase commit, and a
/// failing remote never undoes the local write.
pub struct CacheManager {
    local: Option<Arc<BoundedCache<Value>>>,
    remote: Option<Arc<dyn CacheTier>>,
    remote_store: Option<Arc<RemoteStore>>,
    default_ttl: Duration,
    in_flight: Option<InFlightMap>,
}

impl CacheManager {
    // == Constructors ==
    /// Creates a manager with no layers enabled.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            local: None,
            remote: None,
            remote_store: None,
            default_ttl,
            in_flight: None,
        }
    }

    /// Builds the layers described by `config`.
    pub fn from_config(config: &CacheConfig) -> Self {
        let mut manager = Self::new(config.default_ttl);

        if config.layers.memory {
            manager = manager.with_local(BoundedCache::new(config.max_size, config.default_ttl));
        }
        if config.layers.redis {
            if !config.remote.is_configured() {
                warn!("Remote layer enabled without a URL or host, it will stay disconnected");
            }
            manager = manager.with_remote_store(RemoteStore::new(config.remote.clone()));
        }
        if config.coalesce_misses {
            manager = manager.with_coalescing();
        }
        manager
    }

    /// Memory-only manager, the default when no remote is configured.
    pub fn memory_only(max_size: usize, default_ttl: Duration) -> Self {
        Self::new(default_ttl).with_local(BoundedCache::new(max_size, default_ttl))
    }

    pub fn with_local(mut self, cache: BoundedCache<Value>) -> Self {
        self.local = Some(Arc::new(cache));
        self
    }

    /// Uses a Redis store as the remote layer.
    pub fn with_remote_store(mut self, store: RemoteStore) -> Self {
        let store = Arc::new(store);
        self.remote = Some(store.clone());
        self.remote_store = Some(store);
        self
    }

    /// Uses any tier as the remote layer.
    pub fn with_remote_tier(mut self, tier: Arc<dyn CacheTier>) -> Self {
        self.remote = Some(tier);
        self.remote_store = None;
        self
    }

    /// Makes concurrent `wrap` misses on the same key share one computation.
    pub fn with_coalescing(mut self) -> Self {
        self.in_flight = Some(DashMap::new());
        self
    }

    /// Returns a deterministic key builder for `prefix`.
    pub fn key_generator(prefix: impl Into<String>) -> KeyGenerator {
        KeyGenerator::new(prefix)
    }

    pub fn local(&self) -> Option<&Arc<BoundedCache<Value>>> {
        self.local.as_ref()
    }

    pub fn remote_store(&self) -> Option<&Arc<RemoteStore>> {
        self.remote_store.as_ref()
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    // == Get ==
    /// Reads local first, then remote, backfilling local on a remote hit.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if let Some(local) = &self.local {
            if let Some(value) = local.get(key) {
                return Some(value);
            }
        }

        let remote = self.remote.as_ref()?;
        let value = remote.get(key).await?;
        if let Some(local) = &self.local {
            local.set(key, value.clone(), None);
        }
        Some(value)
    }

    /// Reads and decodes a value; values that do not decode as `T` are misses.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                debug!("Cached value for {} has unexpected shape: {}", key, e);
                None
            }
        }
    }

    // == Set ==
    /// Writes to every enabled layer.
    ///
    /// Without a TTL the local layer applies its default, and the remote
    /// layer receives the manager default so shared entries still expire.
    pub async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        if let Some(local) = &self.local {
            local.set(key, value.clone(), ttl);
        }
        if let Some(remote) = &self.remote {
            remote
                .set(key, value, Some(ttl.unwrap_or(self.default_ttl)))
                .await;
        }
    }

    /// Encodes and stores a value. Values that cannot be encoded are skipped.
    pub async fn set_as<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        match serde_json::to_value(value) {
            Ok(encoded) => self.set(key, encoded, ttl).await,
            Err(e) => warn!("Not caching {}: {}", key, e),
        }
    }

    // == Has ==
    /// Checks local, then falls back to a full remote `get`.
    ///
    /// The remote check transfers the value, so this is not a cheap
    /// existence probe when the local layer misses.
    pub async fn has(&self, key: &str) -> bool {
        if let Some(local) = &self.local {
            if local.has(key) {
                return true;
            }
        }
        match &self.remote {
            Some(remote) => remote.get(key).await.is_some(),
            None => false,
        }
    }

    // == Delete ==
    /// Deletes from every layer; true if any layer removed something.
    pub async fn delete(&self, key: &str) -> bool {
        let local_removed = self.local.as_ref().is_some_and(|local| local.delete(key));
        let remote_removed = match &self.remote {
            Some(remote) => remote.delete(key).await,
            None => false,
        };
        local_removed || remote_removed
    }

    // == Clear ==
    /// Clears the remote layer by pattern (default `*`).
    ///
    /// The local layer is only cleared when no pattern is given; use
    /// [`CacheManager::invalidate`] for pattern-scoped local removal.
    pub async fn clear(&self, pattern: Option<&str>) {
        if pattern.is_none() {
            if let Some(local) = &self.local {
                local.clear();
            }
        }
        if let Some(remote) = &self.remote {
            remote
                .invalidate(&[pattern.unwrap_or("*").to_string()])
                .await;
        }
    }

    // == Invalidate ==
    /// Removes keys matching any glob from both layers.
    pub async fn invalidate<S: AsRef<str>>(&self, patterns: &[S]) {
        let patterns: Vec<String> = patterns.iter().map(|p| p.as_ref().to_string()).collect();

        if let Some(local) = &self.local {
            for pattern in &patterns {
                match glob_to_regex(pattern) {
                    Ok(matcher) => {
                        let removed = local.delete_matching(&matcher);
                        debug!("Invalidated {} local keys for '{}'", removed, pattern);
                    }
                    Err(e) => warn!("Skipping invalid pattern '{}': {}", pattern, e),
                }
            }
        }
        if let Some(remote) = &self.remote {
            remote.invalidate(&patterns).await;
        }
    }

    // == Wrap ==
    /// Returns the cached value for `key`, or computes, stores and returns it.
    ///
    /// Compute errors are returned as-is and nothing is cached. Concurrent
    /// misses each run `compute` unless the manager was built with
    /// [`CacheManager::with_coalescing`].
    pub async fn wrap<T, E, F, Fut>(&self, key: &str, compute: F, ttl: Option<Duration>) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get_as::<T>(key).await {
            return Ok(cached);
        }

        let _in_flight = match &self.in_flight {
            Some(map) => {
                let claim = InFlight::acquire(map, key).await;
                // another caller may have filled the key while we waited
                if let Some(cached) = self.get_as::<T>(key).await {
                    return Ok(cached);
                }
                Some(claim)
            }
            None => None,
        };

        let value = compute().await?;
        self.set_as(key, &value, ttl).await;
        Ok(value)
    }

    // == Stats ==
    pub async fn stats(&self) -> ManagerStats {
        let remote = match &self.remote_store {
            Some(store) => Some(store.stats().await),
            None => None,
        };
        ManagerStats {
            local: self.local.as_ref().map(|local| local.stats()),
            remote,
        }
    }

    /// Closes the remote connection, if any.
    pub async fn disconnect(&self) {
        if let Some(store) = &self.remote_store {
            store.disconnect().await;
        }
    }
}

// == In-Flight Claim ==
/// Holds the per-key computation lock; the map entry is dropped with the
/// last claim.
struct InFlight<'a> {
    map: &'a InFlightMap,
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> InFlight<'a> {
    async fn acquire(map: &'a InFlightMap, key: &str) -> InFlight<'a> {
        let lock = map.entry(key.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        InFlight {
            map,
            key: key.to_string(),
            guard: Some(guard),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.map
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[async_trait]
impl CacheTier for CacheManager {
    async fn get(&self, key: &str) -> Option<Value> {
        CacheManager::get(self, key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        CacheManager::set(self, key, value, ttl).await;
    }

    async fn delete(&self, key: &str) -> bool {
        CacheManager::delete(self, key).await
    }

    async fn invalidate(&self, patterns: &[String]) {
        CacheManager::invalidate(self, patterns).await;
    }
}
