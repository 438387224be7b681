//! TTL Prune Task
//!
//! Background task that periodically removes expired entries from a local cache.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::{BoundedCache, EstimateSize};

/// Spawns a background task that periodically prunes expired cache entries.
///
/// Access-triggered expiry already hides stale entries; this sweep only
/// releases their memory early.
///
/// # Returns
/// A JoinHandle for the spawned task, which should be aborted on shutdown.
///
/// # Example
/// ```ignore
/// let cache = Arc::new(BoundedCache::<serde_json::Value>::new(1024, Duration::from_secs(60)));
/// let prune_handle = spawn_prune_task(cache.clone(), Duration::from_secs(30));
/// // Later, during shutdown:
/// prune_handle.abort();
/// ```
pub fn spawn_prune_task<V>(cache: Arc<BoundedCache<V>>, interval: Duration) -> JoinHandle<()>
where
    V: EstimateSize + Clone + Send + 'static,
{
    tokio::spawn(async move {
        info!("Starting TTL prune task with interval of {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;

            let removed = cache.prune();
            if removed > 0 {
                info!("TTL prune: removed {} expired entries", removed);
            } else {
                debug!("TTL prune: no expired entries found");
            }
        }
    })
}
