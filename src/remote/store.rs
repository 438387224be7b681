//! Remote Store Module
//!
//! Redis adapter behind a get/set/delete/clear contract that never fails:
//! an unreachable backend degrades to misses.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::RemoteStoreConfig;
use crate::remote::events::{ConnectionEvent, EVENT_CHANNEL_CAPACITY};
use crate::tier::CacheTier;

// == Connection State ==
enum ConnectionState {
    /// No attempt made yet
    Idle,
    Connected(MultiplexedConnection),
    /// The attempt failed or the connection dropped; no retry until reset
    Failed,
    /// Closed by `disconnect()`
    Closed,
    /// No socket access in this runtime
    Unsupported,
}

/// Returns false in runtimes that cannot open raw TCP sockets.
pub fn sockets_available() -> bool {
    !cfg!(target_arch = "wasm32")
}

// == Remote Stats ==
#[derive(Debug, Default)]
struct RemoteMetrics {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
    connect_attempts: AtomicU64,
}

/// Snapshot of remote tier counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RemoteStats {
    /// Commands actually sent to the backend
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub connect_attempts: u64,
    pub connected: bool,
}

// == Remote Store ==
/// Lazily connected, namespaced Redis tier.
///
/// A single multiplexed connection is shared by all callers. The first
/// operation triggers the only connection attempt; once it fails, every
/// operation returns absent/false until [`RemoteStore::reset`] is called.
pub struct RemoteStore {
    config: RemoteStoreConfig,
    state: Mutex<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    metrics: RemoteMetrics,
}

impl RemoteStore {
    pub fn new(config: RemoteStoreConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            state: Mutex::new(ConnectionState::Idle),
            events,
            metrics: RemoteMetrics::default(),
        }
    }

    pub fn config(&self) -> &RemoteStoreConfig {
        &self.config
    }

    /// Subscribes to connectivity state changes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Prepends the configured namespace to a key.
    pub fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    // == Get ==
    /// Fetches and decodes a value. Decode and backend errors are misses.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut conn = self.connection().await?;
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let result: redis::RedisResult<Option<String>> = conn.get(self.namespaced(key)).await;
        match result {
            Ok(Some(payload)) => match serde_json::from_str(&payload) {
                Ok(value) => {
                    self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                    debug!("Remote cache hit for key: {}", key);
                    Some(value)
                }
                Err(e) => {
                    self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                    warn!("Discarding undecodable remote value for key {}: {}", key, e);
                    None
                }
            },
            Ok(None) => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                debug!("Remote cache miss for key: {}", key);
                None
            }
            Err(e) => {
                self.record_failure("get", &e).await;
                None
            }
        }
    }

    // == Set ==
    /// Encodes and stores a value, using native expiry when a TTL is given.
    pub async fn set(&self, key: &str, value: &Value, ttl: Option<Duration>) {
        let Some(mut conn) = self.connection().await else {
            return;
        };
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Cannot encode value for key {}: {}", key, e);
                return;
            }
        };
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let namespaced = self.namespaced(key);
        let result: redis::RedisResult<()> = match ttl {
            Some(ttl) => conn.set_ex(&namespaced, payload, ttl_seconds(ttl)).await,
            None => conn.set(&namespaced, payload).await,
        };

        match result {
            Ok(()) => debug!("Remote cache set for key: {}", key),
            Err(e) => self.record_failure("set", &e).await,
        }
    }

    // == Delete ==
    pub async fn delete(&self, key: &str) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let result: redis::RedisResult<usize> = conn.del(self.namespaced(key)).await;
        match result {
            Ok(removed) => removed > 0,
            Err(e) => {
                self.record_failure("delete", &e).await;
                false
            }
        }
    }

    // == Clear ==
    /// Deletes every namespaced key matching the glob in one batch.
    ///
    /// Returns the number of keys removed.
    pub async fn clear(&self, pattern: &str) -> usize {
        let Some(mut conn) = self.connection().await else {
            return 0;
        };
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        let keys: Vec<String> = match conn.keys(self.namespaced(pattern)).await {
            Ok(keys) => keys,
            Err(e) => {
                self.record_failure("clear", &e).await;
                return 0;
            }
        };
        if keys.is_empty() {
            return 0;
        }

        self.metrics.requests.fetch_add(1, Ordering::Relaxed);
        let result: redis::RedisResult<usize> = conn.del(keys).await;
        match result {
            Ok(removed) => {
                debug!("Remote clear '{}' removed {} keys", pattern, removed);
                removed
            }
            Err(e) => {
                self.record_failure("clear", &e).await;
                0
            }
        }
    }

    // == Lifecycle ==
    /// Drops the shared connection. Later operations no-op until `reset()`.
    pub async fn disconnect(&self) {
        let mut state = self.state.lock().await;
        if matches!(*state, ConnectionState::Connected(_)) {
            info!("Disconnecting from remote cache");
        }
        *state = ConnectionState::Closed;
        let _ = self.events.send(ConnectionEvent::Disconnected);
    }

    /// Forgets any previous failure so the next operation connects again.
    pub async fn reset(&self) {
        *self.state.lock().await = ConnectionState::Idle;
    }

    pub async fn is_connected(&self) -> bool {
        matches!(*self.state.lock().await, ConnectionState::Connected(_))
    }

    pub async fn stats(&self) -> RemoteStats {
        RemoteStats {
            requests: self.metrics.requests.load(Ordering::Relaxed),
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            errors: self.metrics.errors.load(Ordering::Relaxed),
            connect_attempts: self.metrics.connect_attempts.load(Ordering::Relaxed),
            connected: self.is_connected().await,
        }
    }

    /// Returns the shared connection, making the one connection attempt if
    /// none has been made yet.
    async fn connection(&self) -> Option<MultiplexedConnection> {
        let mut state = self.state.lock().await;
        match &*state {
            ConnectionState::Connected(conn) => return Some(conn.clone()),
            ConnectionState::Idle => {}
            _ => return None,
        }

        if !sockets_available() {
            info!("No socket access in this runtime, remote cache disabled");
            *state = ConnectionState::Unsupported;
            let _ = self.events.send(ConnectionEvent::SocketsUnavailable);
            return None;
        }

        self.metrics.connect_attempts.fetch_add(1, Ordering::Relaxed);
        match self.connect().await {
            Ok(conn) => {
                info!("Connected to remote cache with prefix '{}'", self.config.key_prefix);
                *state = ConnectionState::Connected(conn.clone());
                let _ = self.events.send(ConnectionEvent::Connected);
                Some(conn)
            }
            Err(reason) => {
                warn!("Remote cache unavailable, continuing memory-only: {}", reason);
                *state = ConnectionState::Failed;
                let _ = self.events.send(ConnectionEvent::ConnectFailed { reason });
                None
            }
        }
    }

    async fn connect(&self) -> Result<MultiplexedConnection, String> {
        let info = self
            .config
            .connection_info()
            .ok_or_else(|| "no remote URL or host configured".to_string())?
            .map_err(|e| format!("invalid remote URL: {}", e))?;
        let client =
            redis::Client::open(info).map_err(|e| format!("invalid remote settings: {}", e))?;

        match tokio::time::timeout(
            self.config.connect_timeout,
            client.get_multiplexed_async_connection(),
        )
        .await
        {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(format!("connection failed: {}", e)),
            Err(_) => Err(format!(
                "connection timed out after {:?}",
                self.config.connect_timeout
            )),
        }
    }

    async fn record_failure(&self, op: &'static str, error: &RedisError) {
        self.metrics.errors.fetch_add(1, Ordering::Relaxed);
        warn!("Remote cache {} failed: {}", op, error);

        if error.is_io_error() || error.is_connection_dropped() {
            let mut state = self.state.lock().await;
            if matches!(*state, ConnectionState::Connected(_)) {
                *state = ConnectionState::Failed;
            }
        }
        let _ = self.events.send(ConnectionEvent::OperationFailed {
            op,
            reason: error.to_string(),
        });
    }
}

/// Converts a TTL to whole seconds, rounding up so short TTLs still expire.
fn ttl_seconds(ttl: Duration) -> u64 {
    let millis = ttl.as_millis() as u64;
    millis.div_ceil(1000).max(1)
}

#[async_trait]
impl CacheTier for RemoteStore {
    async fn get(&self, key: &str) -> Option<Value> {
        RemoteStore::get(self, key).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        RemoteStore::set(self, key, &value, ttl).await;
    }

    async fn delete(&self, key: &str) -> bool {
        RemoteStore::delete(self, key).await
    }

    async fn invalidate(&self, patterns: &[String]) {
        for pattern in patterns {
            self.clear(pattern).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    /// Nothing listens on port 1, so connecting is refused immediately.
    fn unreachable_store() -> RemoteStore {
        RemoteStore::new(RemoteStoreConfig {
            connect_timeout: Duration::from_millis(500),
            ..RemoteStoreConfig::with_url("redis://127.0.0.1:1/")
        })
    }

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_millis(1)), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(1000)), 1);
        assert_eq!(ttl_seconds(Duration::from_millis(1001)), 2);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
        assert_eq!(ttl_seconds(Duration::from_secs(300)), 300);
    }

    #[test]
    fn test_namespaced_keys() {
        let store = RemoteStore::new(RemoteStoreConfig::default());
        assert_eq!(store.namespaced("user:1"), "cache:user:1");
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_to_misses() {
        let store = unreachable_store();
        let mut events = store.subscribe();

        store.set("k", &json!(1), Some(Duration::from_secs(10))).await;
        assert_eq!(store.get("k").await, None);
        assert!(!store.delete("k").await);
        assert_eq!(store.clear("*").await, 0);

        let stats = store.stats().await;
        assert_eq!(stats.connect_attempts, 1, "Connection is attempted only once");
        assert_eq!(stats.requests, 0);
        assert!(!stats.connected);

        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectionEvent::ConnectFailed { .. }
        ));
    }

    #[tokio::test]
    async fn test_reset_allows_another_attempt() {
        let store = unreachable_store();

        store.get("k").await;
        store.get("k").await;
        store.reset().await;
        store.get("k").await;

        assert_eq!(store.stats().await.connect_attempts, 2);
    }

    #[tokio::test]
    async fn test_unconfigured_store_never_connects() {
        let store = RemoteStore::new(RemoteStoreConfig::default());
        let mut events = store.subscribe();

        assert_eq!(store.get("k").await, None);

        match events.recv().await.unwrap() {
            ConnectionEvent::ConnectFailed { reason } => {
                assert!(reason.contains("no remote URL"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disconnect_before_use() {
        let store = unreachable_store();
        let mut events = store.subscribe();

        store.disconnect().await;
        assert_eq!(store.get("k").await, None);

        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Disconnected);
        assert_eq!(store.stats().await.connect_attempts, 0);
    }

    // Requires a live Redis at REDIS_URL (default redis://127.0.0.1:6379).
    #[tokio::test]
    #[ignore]
    async fn test_live_roundtrip() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let store = RemoteStore::new(RemoteStoreConfig {
            key_prefix: "tiered_cache:test:".into(),
            ..RemoteStoreConfig::with_url(url)
        });

        store.set("user:1", &json!({"name": "ada"}), Some(Duration::from_secs(30))).await;
        store.set("user:2", &json!({"name": "bob"}), None).await;
        assert_eq!(store.get("user:1").await, Some(json!({"name": "ada"})));
        assert!(store.is_connected().await);

        assert_eq!(store.clear("user:*").await, 2);
        assert_eq!(store.get("user:2").await, None);
        store.disconnect().await;
    }
}
