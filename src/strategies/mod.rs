//! Cache Strategies Module
//!
//! Policies layered on top of [`CacheManager`](crate::manager::CacheManager)
//! that decide when writes reach the authoritative data source and when
//! cached values are refreshed.
//!
//! # Strategies
//! - [`WriteThrough`]: cache-first reads with fetch fallback, direct writes
//! - [`WriteAround`]: writes go to the source and invalidate the cache
//! - [`WriteBehind`]: writes are cached now and persisted in batches later
//! - [`RefreshAhead`]: soon-to-expire values are refetched in the background
//! - [`MultiTierCache`]: an ordered cascade of arbitrary tiers

mod multi_tier;
mod refresh_ahead;
mod write_around;
mod write_behind;
mod write_through;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{CacheError, Result};

pub use multi_tier::{MultiTierCache, Tier, TierStats};
pub use refresh_ahead::{RefreshAhead, RefreshAheadOptions};
pub use write_around::{WriteAround, WriteAroundOptions};
pub use write_behind::{QueuedWrite, WriteBehind, WriteBehindOptions};
pub use write_through::{WriteThrough, WriteThroughOptions};

// == Data Source Callbacks ==
/// Loads a value from the authoritative source; `None` when it does not exist.
pub type DataFetcher =
    Arc<dyn Fn(String) -> BoxFuture<'static, anyhow::Result<Option<Value>>> + Send + Sync>;

/// Persists one value to the authoritative source.
pub type DataWriter =
    Arc<dyn Fn(String, Value) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Persists a batch of queued writes in one call.
pub type BatchWriter =
    Arc<dyn Fn(Vec<QueuedWrite>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Wraps an async closure as a [`DataFetcher`].
pub fn data_fetcher<F, Fut>(fetch: F) -> DataFetcher
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Option<Value>>> + Send + 'static,
{
    Arc::new(move |key| Box::pin(fetch(key)))
}

/// Wraps an async closure as a [`DataWriter`].
pub fn data_writer<F, Fut>(write: F) -> DataWriter
where
    F: Fn(String, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |key, value| Box::pin(write(key, value)))
}

/// Wraps an async closure as a [`BatchWriter`].
pub fn batch_writer<F, Fut>(write: F) -> BatchWriter
where
    F: Fn(Vec<QueuedWrite>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |batch| Box::pin(write(batch)))
}

// == Strategy Contract ==
/// The contract shared by every caching strategy.
#[async_trait]
pub trait CacheStrategy: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    async fn invalidate(&self, patterns: &[String]);
}

/// Unwraps a required callback or reports which option is missing.
fn required<T>(callback: Option<T>, strategy: &str, name: &str) -> Result<T> {
    callback.ok_or_else(|| CacheError::Configuration(format!("{} requires a {}", strategy, name)))
}

fn non_zero(interval: Duration, strategy: &str, name: &str) -> Result<Duration> {
    if interval.is_zero() {
        return Err(CacheError::Configuration(format!(
            "{} {} must be greater than zero",
            strategy, name
        )));
    }
    Ok(interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_callback_helpers() {
        let fetch = data_fetcher(|key| async move { Ok(Some(json!(key))) });
        assert_eq!(fetch("a".into()).await.unwrap(), Some(json!("a")));

        let write = data_writer(|_, _| async { anyhow::bail!("read-only") });
        assert!(write("a".into(), json!(1)).await.is_err());

        let batch = batch_writer(|batch| async move {
            assert_eq!(batch.len(), 0);
            Ok(())
        });
        assert!(batch(Vec::new()).await.is_ok());
    }

    #[test]
    fn test_required_option_message() {
        let missing: Option<DataWriter> = None;
        let error = required(missing, "WriteAround", "data_writer").err().unwrap();
        assert_eq!(
            error.to_string(),
            "Invalid configuration: WriteAround requires a data_writer"
        );
        assert!(non_zero(Duration::ZERO, "WriteBehind", "flush_interval").is_err());
    }
}
