//! Write-around strategy
//!
//! Writes bypass the cache: they go straight to the data source and the
//! cached copy is dropped so the next read sees fresh data.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{required, CacheStrategy, DataWriter};
use crate::error::Result;
use crate::manager::CacheManager;

/// Options for [`WriteAround`].
#[derive(Clone, Default)]
pub struct WriteAroundOptions {
    /// Required. Persists every write.
    pub data_writer: Option<DataWriter>,
}

pub struct WriteAround {
    cache: Arc<CacheManager>,
    writer: DataWriter,
}

impl WriteAround {
    pub fn new(cache: Arc<CacheManager>, options: WriteAroundOptions) -> Result<Self> {
        let writer = required(options.data_writer, "WriteAround", "data_writer")?;
        Ok(Self { cache, writer })
    }
}

#[async_trait]
impl CacheStrategy for WriteAround {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.cache.get(key).await)
    }

    /// The TTL is ignored: nothing is cached on write.
    async fn set(&self, key: &str, value: Value, _ttl: Option<Duration>) -> Result<()> {
        (self.writer)(key.to_string(), value).await?;
        self.cache.delete(key).await;
        Ok(())
    }

    async fn invalidate(&self, patterns: &[String]) {
        self.cache.invalidate(patterns).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use crate::strategies::data_writer;
    use serde_json::json;

    fn manager() -> Arc<CacheManager> {
        Arc::new(CacheManager::memory_only(1024 * 1024, Duration::from_secs(60)))
    }

    #[test]
    fn test_requires_writer() {
        let result = WriteAround::new(manager(), WriteAroundOptions::default());
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_set_writes_source_and_evicts_cached_copy() {
        let cache = manager();
        cache.set("k", json!("stale"), None).await;

        let strategy = WriteAround::new(
            cache.clone(),
            WriteAroundOptions {
                data_writer: Some(data_writer(|_, _| async { Ok(()) })),
            },
        )
        .unwrap();

        strategy.set("k", json!("fresh"), None).await.unwrap();
        assert_eq!(strategy.get("k").await.unwrap(), None);
        assert!(!cache.has("k").await);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_cached_copy() {
        let cache = manager();
        cache.set("k", json!("cached"), None).await;

        let strategy = WriteAround::new(
            cache.clone(),
            WriteAroundOptions {
                data_writer: Some(data_writer(|_, _| async { anyhow::bail!("rejected") })),
            },
        )
        .unwrap();

        assert!(strategy.set("k", json!("new"), None).await.is_err());
        assert_eq!(strategy.get("k").await.unwrap(), Some(json!("cached")));
    }
}
