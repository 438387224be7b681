//! Refresh-ahead strategy
//!
//! Values are stored with their absolute expiry. A read that finds a value
//! inside the refresh window still returns it, but queues the key so a
//! background sweep can refetch it before it expires.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{non_zero, required, CacheStrategy, DataFetcher};
use crate::cache::current_timestamp_ms;
use crate::error::{CacheError, Result};
use crate::manager::CacheManager;

/// Default fraction of the TTL that may elapse before a read triggers a refresh.
pub const DEFAULT_REFRESH_THRESHOLD: f64 = 0.8;

/// Default interval between refresh sweeps.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Options for [`RefreshAhead`].
#[derive(Clone)]
pub struct RefreshAheadOptions {
    /// Required. Loads fresh values from the data source.
    pub data_fetcher: Option<DataFetcher>,
    /// TTL for stored values; the manager default when unset.
    pub ttl: Option<Duration>,
    /// Refresh once less than `refresh_threshold * ttl` remains. Must be in (0, 1].
    pub refresh_threshold: f64,
    pub refresh_interval: Duration,
}

impl Default for RefreshAheadOptions {
    fn default() -> Self {
        Self {
            data_fetcher: None,
            ttl: None,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
        }
    }
}

/// What is actually stored in the cache for each key.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: Value,
    #[serde(rename = "expiresAt")]
    expires_at: u64,
    /// Milliseconds
    ttl: u64,
}

impl Envelope {
    fn new(value: Value, ttl: Duration) -> Self {
        let ttl = ttl.as_millis() as u64;
        Self {
            value,
            expires_at: current_timestamp_ms().saturating_add(ttl),
            ttl,
        }
    }

    fn remaining_ms(&self) -> u64 {
        self.expires_at.saturating_sub(current_timestamp_ms())
    }
}

struct Refresher {
    cache: Arc<CacheManager>,
    fetcher: DataFetcher,
    /// Keys awaiting refresh, with the TTL to store them under.
    queue: Mutex<HashMap<String, Duration>>,
}

impl Refresher {
    async fn store(&self, key: &str, value: Value, ttl: Duration) -> Result<()> {
        let envelope = serde_json::to_value(Envelope::new(value, ttl))?;
        self.cache.set(key, envelope, Some(ttl)).await;
        Ok(())
    }

    /// Refetches every queued key. Failures are logged per key.
    async fn sweep(&self) -> usize {
        let due = std::mem::take(&mut *self.queue.lock());
        let mut refreshed = 0;

        for (key, ttl) in due {
            match (self.fetcher)(key.clone()).await {
                Ok(Some(value)) => match self.store(&key, value, ttl).await {
                    Ok(()) => refreshed += 1,
                    Err(e) => warn!("Failed to store refreshed value for '{}': {}", key, e),
                },
                Ok(None) => {
                    debug!("'{}' no longer exists at the source, dropping", key);
                    self.cache.delete(&key).await;
                }
                Err(e) => warn!("Failed to refresh '{}': {}", key, e),
            }
        }

        if refreshed > 0 {
            debug!("Refreshed {} keys ahead of expiry", refreshed);
        }
        refreshed
    }
}

fn spawn_refresh_task(refresher: Arc<Refresher>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Refresh-ahead task started with interval {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;
            refresher.sweep().await;
        }
    })
}

pub struct RefreshAhead {
    refresher: Arc<Refresher>,
    ttl: Duration,
    threshold: f64,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshAhead {
    /// Builds the strategy and starts its refresh sweep.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(cache: Arc<CacheManager>, options: RefreshAheadOptions) -> Result<Self> {
        let fetcher = required(options.data_fetcher, "RefreshAhead", "data_fetcher")?;
        let interval = non_zero(options.refresh_interval, "RefreshAhead", "refresh_interval")?;
        let threshold = options.refresh_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(CacheError::Configuration(format!(
                "RefreshAhead refresh_threshold must be in (0, 1], got {}",
                threshold
            )));
        }

        let ttl = options.ttl.unwrap_or_else(|| cache.default_ttl());
        let refresher = Arc::new(Refresher {
            cache,
            fetcher,
            queue: Mutex::new(HashMap::new()),
        });
        let refresh_task = spawn_refresh_task(refresher.clone(), interval);

        Ok(Self {
            refresher,
            ttl,
            threshold,
            refresh_task: Mutex::new(Some(refresh_task)),
        })
    }

    /// Keys currently queued for refresh.
    pub fn pending_refreshes(&self) -> usize {
        self.refresher.queue.lock().len()
    }

    /// Runs a refresh sweep now. Returns how many keys were refreshed.
    pub async fn refresh_pending(&self) -> usize {
        self.refresher.sweep().await
    }

    /// Stops the background sweep. Queued keys are dropped.
    pub fn destroy(&self) {
        if let Some(task) = self.refresh_task.lock().take() {
            task.abort();
        }
        self.refresher.queue.lock().clear();
    }

    fn needs_refresh(&self, envelope: &Envelope) -> bool {
        (envelope.remaining_ms() as f64) < self.threshold * envelope.ttl as f64
    }
}

impl Drop for RefreshAhead {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_task.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl CacheStrategy for RefreshAhead {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(raw) = self.refresher.cache.get(key).await {
            match serde_json::from_value::<Envelope>(raw) {
                Ok(envelope) => {
                    if self.needs_refresh(&envelope) {
                        let ttl = Duration::from_millis(envelope.ttl);
                        self.refresher.queue.lock().insert(key.to_string(), ttl);
                    }
                    return Ok(Some(envelope.value));
                }
                Err(e) => debug!("Ignoring non-envelope value at '{}': {}", key, e),
            }
        }

        let fetched = (self.refresher.fetcher)(key.to_string()).await?;
        if let Some(value) = &fetched {
            self.refresher.store(key, value.clone(), self.ttl).await?;
        }
        Ok(fetched)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.refresher
            .store(key, value, ttl.unwrap_or(self.ttl))
            .await
    }

    async fn invalidate(&self, patterns: &[String]) {
        self.refresher.cache.invalidate(patterns).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::data_fetcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> Arc<CacheManager> {
        Arc::new(CacheManager::memory_only(1024 * 1024, Duration::from_secs(60)))
    }

    fn options(fetcher: DataFetcher) -> RefreshAheadOptions {
        RefreshAheadOptions {
            data_fetcher: Some(fetcher),
            ttl: Some(Duration::from_millis(1000)),
            refresh_threshold: 0.5,
            refresh_interval: Duration::from_secs(3600),
        }
    }

    fn counting_fetcher(calls: &Arc<AtomicUsize>) -> DataFetcher {
        let counter = calls.clone();
        data_fetcher(move |key| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok(Some(json!(format!("{}-v{}", key, n + 1)))) }
        })
    }

    #[tokio::test]
    async fn test_rejects_invalid_options() {
        assert!(matches!(
            RefreshAhead::new(manager(), RefreshAheadOptions::default()),
            Err(CacheError::Configuration(_))
        ));

        let calls = Arc::new(AtomicUsize::new(0));
        for threshold in [0.0, -0.5, 1.5, f64::NAN] {
            let mut opts = options(counting_fetcher(&calls));
            opts.refresh_threshold = threshold;
            assert!(RefreshAhead::new(manager(), opts).is_err());
        }

        let mut opts = options(counting_fetcher(&calls));
        opts.refresh_threshold = 1.0;
        assert!(RefreshAhead::new(manager(), opts).is_ok());
    }

    #[tokio::test]
    async fn test_stores_envelope() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = manager();
        let strategy = RefreshAhead::new(cache.clone(), options(counting_fetcher(&calls))).unwrap();

        strategy.set("k", json!({"n": 1}), None).await.unwrap();

        let raw = cache.get("k").await.unwrap();
        assert_eq!(raw["value"], json!({"n": 1}));
        assert_eq!(raw["ttl"], json!(1000));
        assert!(raw["expiresAt"].as_u64().unwrap() > current_timestamp_ms());
        assert_eq!(strategy.get("k").await.unwrap(), Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_fresh_read_does_not_queue_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = RefreshAhead::new(manager(), options(counting_fetcher(&calls))).unwrap();

        strategy.set("k", json!("v"), None).await.unwrap();
        assert_eq!(strategy.get("k").await.unwrap(), Some(json!("v")));
        assert_eq!(strategy.pending_refreshes(), 0);
    }

    #[tokio::test]
    async fn test_read_inside_window_queues_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = manager();
        let strategy = RefreshAhead::new(cache.clone(), options(counting_fetcher(&calls))).unwrap();

        strategy.set("k", json!("original"), None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;

        assert_eq!(strategy.get("k").await.unwrap(), Some(json!("original")));
        assert_eq!(strategy.pending_refreshes(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(strategy.refresh_pending().await, 1);
        assert_eq!(strategy.pending_refreshes(), 0);
        assert_eq!(strategy.get("k").await.unwrap(), Some(json!("k-v1")));
    }

    #[tokio::test]
    async fn test_miss_fetches_inline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = RefreshAhead::new(manager(), options(counting_fetcher(&calls))).unwrap();

        assert_eq!(strategy.get("user").await.unwrap(), Some(json!("user-v1")));
        assert_eq!(strategy.get("user").await.unwrap(), Some(json!("user-v1")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sweep_isolates_failures() {
        let fetcher = data_fetcher(|key| async move {
            if key == "bad" {
                anyhow::bail!("source timeout");
            }
            Ok(Some(json!("fresh")))
        });
        let cache = manager();
        let strategy = RefreshAhead::new(cache.clone(), options(fetcher)).unwrap();

        strategy.set("bad", json!("old"), None).await.unwrap();
        strategy.set("good", json!("old"), None).await.unwrap();
        {
            let mut queue = strategy.refresher.queue.lock();
            queue.insert("bad".to_string(), Duration::from_millis(1000));
            queue.insert("good".to_string(), Duration::from_millis(1000));
        }

        assert_eq!(strategy.refresh_pending().await, 1);
        assert_eq!(strategy.get("good").await.unwrap(), Some(json!("fresh")));
        assert_eq!(strategy.get("bad").await.unwrap(), Some(json!("old")));
    }

    #[tokio::test]
    async fn test_destroy_clears_queue() {
        let calls = Arc::new(AtomicUsize::new(0));
        let strategy = RefreshAhead::new(manager(), options(counting_fetcher(&calls))).unwrap();
        strategy
            .refresher
            .queue
            .lock()
            .insert("k".to_string(), Duration::from_secs(1));

        strategy.destroy();
        assert_eq!(strategy.pending_refreshes(), 0);
        assert!(strategy.refresh_task.lock().is_none());
    }
}
