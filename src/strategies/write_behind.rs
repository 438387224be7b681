//! Write-behind strategy
//!
//! Writes land in the cache immediately and are queued for the data source.
//! The queue is flushed as one batch when it reaches `max_queue_size` or when
//! the flush timer fires, whichever comes first.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::{non_zero, required, BatchWriter, CacheStrategy};
use crate::error::{CacheError, Result};
use crate::manager::CacheManager;

/// Default interval between timed flushes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);

/// Default queue length that forces a flush.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// A write waiting to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedWrite {
    pub key: String,
    pub value: Value,
    pub ttl: Option<Duration>,
}

/// Options for [`WriteBehind`].
#[derive(Clone)]
pub struct WriteBehindOptions {
    /// Required. Persists a batch of queued writes.
    pub batch_writer: Option<BatchWriter>,
    pub flush_interval: Duration,
    pub max_queue_size: usize,
}

impl Default for WriteBehindOptions {
    fn default() -> Self {
        Self {
            batch_writer: None,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
        }
    }
}

struct WriteQueue {
    pending: Mutex<Vec<QueuedWrite>>,
    /// Batches handed to the writer and not yet finished, oldest first.
    in_flight: Mutex<Vec<(u64, Vec<QueuedWrite>)>>,
    next_batch: AtomicU64,
    writer: BatchWriter,
}

impl WriteQueue {
    /// Queues a write, replacing any pending write for the same key in place.
    /// Returns the queue length afterwards.
    fn push(&self, write: QueuedWrite) -> usize {
        let mut pending = self.pending.lock();
        match pending.iter_mut().find(|queued| queued.key == write.key) {
            Some(queued) => *queued = write,
            None => pending.push(write),
        }
        pending.len()
    }

    /// Queued writes win over in-flight ones, newer batches over older.
    fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(queued) = self.pending.lock().iter().find(|queued| queued.key == key) {
            return Some(queued.value.clone());
        }
        self.in_flight
            .lock()
            .iter()
            .rev()
            .flat_map(|(_, batch)| batch.iter())
            .find(|queued| queued.key == key)
            .map(|queued| queued.value.clone())
    }

    fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Sends everything queued to the batch writer.
    ///
    /// The batch stays readable through `lookup` until the writer returns.
    /// A failed batch is not retried.
    async fn flush(&self) -> Result<usize> {
        let (id, batch) = {
            let mut pending = self.pending.lock();
            if pending.is_empty() {
                return Ok(0);
            }
            let batch = std::mem::take(&mut *pending);
            let id = self.next_batch.fetch_add(1, Ordering::Relaxed);
            self.in_flight.lock().push((id, batch.clone()));
            (id, batch)
        };

        let count = batch.len();
        let _in_flight = InFlightBatch { queue: self, id };
        let result = (self.writer)(batch).await;

        result.map_err(CacheError::Source)?;
        debug!("Flushed {} queued writes", count);
        Ok(count)
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.flush().await {
            error!("Write-behind flush failed, batch discarded: {}", e);
        }
    }
}

/// Removes a batch from `in_flight` when its flush ends or is cancelled.
struct InFlightBatch<'a> {
    queue: &'a WriteQueue,
    id: u64,
}

impl Drop for InFlightBatch<'_> {
    fn drop(&mut self) {
        self.queue
            .in_flight
            .lock()
            .retain(|(batch_id, _)| *batch_id != self.id);
    }
}

fn spawn_flush_task(queue: Arc<WriteQueue>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Write-behind flush task started with interval {:?}", interval);

        loop {
            tokio::time::sleep(interval).await;
            queue.flush_logged().await;
        }
    })
}

pub struct WriteBehind {
    cache: Arc<CacheManager>,
    queue: Arc<WriteQueue>,
    max_queue_size: usize,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl WriteBehind {
    /// Builds the strategy and starts its flush timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(cache: Arc<CacheManager>, options: WriteBehindOptions) -> Result<Self> {
        let writer = required(options.batch_writer, "WriteBehind", "batch_writer")?;
        let flush_interval = non_zero(options.flush_interval, "WriteBehind", "flush_interval")?;
        if options.max_queue_size == 0 {
            return Err(CacheError::Configuration(
                "WriteBehind max_queue_size must be greater than zero".to_string(),
            ));
        }

        let queue = Arc::new(WriteQueue {
            pending: Mutex::new(Vec::new()),
            in_flight: Mutex::new(Vec::new()),
            next_batch: AtomicU64::new(0),
            writer,
        });
        let flush_task = spawn_flush_task(queue.clone(), flush_interval);

        Ok(Self {
            cache,
            queue,
            max_queue_size: options.max_queue_size,
            flush_task: Mutex::new(Some(flush_task)),
        })
    }

    /// Persists everything queued now. Returns how many writes were sent.
    pub async fn flush(&self) -> Result<usize> {
        self.queue.flush().await
    }

    /// Number of writes waiting to be persisted.
    pub fn pending_writes(&self) -> usize {
        self.queue.len()
    }

    /// Stops the flush timer and persists whatever is still queued.
    pub async fn destroy(&self) -> Result<usize> {
        if let Some(task) = self.flush_task.lock().take() {
            task.abort();
        }
        self.queue.flush().await
    }
}

impl Drop for WriteBehind {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.get_mut().take() {
            task.abort();
        }
    }
}

#[async_trait]
impl CacheStrategy for WriteBehind {
    /// Pending writes are visible to reads even if the cache has evicted them.
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.queue.lookup(key) {
            return Ok(Some(value));
        }
        Ok(self.cache.get(key).await)
    }

    /// Flush failures on a forced flush are logged, not returned.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        self.cache.set(key, value.clone(), ttl).await;

        let queued = self.queue.push(QueuedWrite {
            key: key.to_string(),
            value,
            ttl,
        });
        if queued >= self.max_queue_size {
            debug!("Write-behind queue full ({}), flushing", queued);
            self.queue.flush_logged().await;
        }
        Ok(())
    }

    async fn invalidate(&self, patterns: &[String]) {
        self.cache.invalidate(patterns).await;
    }
}
