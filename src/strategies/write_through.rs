//! Write-through strategy
//!
//! Reads are served from the cache and fall back to the data source on a
//! miss. Writes go to the data source (when a writer is configured) and then
//! into the cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::{required, CacheStrategy, DataFetcher, DataWriter};
use crate::error::Result;
use crate::manager::CacheManager;

/// Options for [`WriteThrough`].
#[derive(Clone, Default)]
pub struct WriteThroughOptions {
    /// Required. Loads values the cache does not hold.
    pub data_fetcher: Option<DataFetcher>,
    /// Optional. Persists values before they are cached.
    pub data_writer: Option<DataWriter>,
    /// TTL for values cached by this strategy; the manager default when unset.
    pub ttl: Option<Duration>,
}

pub struct WriteThrough {
    cache: Arc<CacheManager>,
    fetcher: DataFetcher,
    writer: Option<DataWriter>,
    ttl: Option<Duration>,
}

impl WriteThrough {
    pub fn new(cache: Arc<CacheManager>, options: WriteThroughOptions) -> Result<Self> {
        let fetcher = required(options.data_fetcher, "WriteThrough", "data_fetcher")?;
        Ok(Self {
            cache,
            fetcher,
            writer: options.data_writer,
            ttl: options.ttl,
        })
    }
}

#[async_trait]
impl CacheStrategy for WriteThrough {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.cache.get(key).await {
            return Ok(Some(value));
        }

        debug!("Write-through miss for '{}', fetching", key);
        let fetched = (self.fetcher)(key.to_string()).await?;
        if let Some(value) = &fetched {
            self.cache.set(key, value.clone(), self.ttl).await;
        }
        Ok(fetched)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        if let Some(writer) = &self.writer {
            writer(key.to_string(), value.clone()).await?;
        }
        self.cache.set(key, value, ttl.or(self.ttl)).await;
        Ok(())
    }

    async fn invalidate(&self, patterns: &[String]) {
        self.cache.invalidate(patterns).await;
    }
}
