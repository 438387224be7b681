//! Bounded Cache Module
//!
//! Main local cache engine combining HashMap storage with LRU tracking,
//! TTL expiration and a byte-size budget.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, EstimateSize, LruTracker};

/// Callback invoked with each evicted key and value.
pub type EvictCallback<V> = Arc<dyn Fn(&str, &V) + Send + Sync>;

// == Cache State ==
/// Everything guarded by the cache mutex.
#[derive(Debug)]
struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    lru: LruTracker,
    stats: CacheStats,
    current_size: usize,
}

impl<V> CacheState<V> {
    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry<V>> {
        let entry = self.entries.remove(key)?;
        self.lru.remove(key);
        self.current_size -= entry.size;
        Some(entry)
    }
}

// == Bounded Cache ==
/// Process-local cache bounded by total estimated byte size, with
/// least-recently-used eviction and per-entry TTL.
///
/// All bookkeeping sits behind a single mutex, so a `BoundedCache` can be
/// shared through an `Arc` and used from any number of tasks.
pub struct BoundedCache<V> {
    state: Mutex<CacheState<V>>,
    max_size: usize,
    default_ttl: Duration,
    on_evict: Option<EvictCallback<V>>,
}

impl<V> fmt::Debug for BoundedCache<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedCache")
            .field("max_size", &self.max_size)
            .field("default_ttl", &self.default_ttl)
            .field("on_evict", &self.on_evict.is_some())
            .finish()
    }
}

impl<V: EstimateSize + Clone> BoundedCache<V> {
    // == Constructor ==
    /// Creates a new cache.
    ///
    /// # Arguments
    /// * `max_size` - Size budget in bytes
    /// * `default_ttl` - TTL for entries stored without an explicit one
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                lru: LruTracker::new(),
                stats: CacheStats::new(max_size),
                current_size: 0,
            }),
            max_size,
            default_ttl,
            on_evict: None,
        }
    }

    /// Registers a callback run for every entry evicted to make room.
    pub fn with_on_evict(mut self, callback: EvictCallback<V>) -> Self {
        self.on_evict = Some(callback);
        self
    }

    // == Set ==
    /// Stores a value with an optional TTL.
    ///
    /// An existing entry for the key is replaced and its size released first.
    /// Least recently used entries are then evicted until the new value fits
    /// or the cache is empty. A value larger than the whole budget is dropped.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) {
        let key = key.into();
        let size = value.estimate_size();
        let ttl = ttl.unwrap_or(self.default_ttl);

        let evicted = {
            let mut state = self.state.lock();
            state.remove_entry(&key);

            let mut evicted = Vec::new();
            while state.current_size + size > self.max_size {
                let Some(oldest) = state.lru.evict_oldest() else {
                    break;
                };
                if let Some(entry) = state.entries.remove(&oldest) {
                    state.current_size -= entry.size;
                    state.stats.record_eviction();
                    evicted.push((oldest, entry.value));
                }
            }

            if size <= self.max_size {
                state.lru.touch(&key);
                state.entries.insert(key.clone(), CacheEntry::new(value, ttl, size));
                state.current_size += size;
            } else {
                debug!(
                    "Dropping '{}': {} bytes exceeds cache budget of {} bytes",
                    key, size, self.max_size
                );
            }
            evicted
        };

        self.notify_evicted(evicted);
    }

    // == Get ==
    /// Retrieves a value, promoting it to most recently used.
    ///
    /// Unknown and expired keys count as misses; expired entries are removed.
    pub fn get(&self, key: &str) -> Option<V> {
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => {
                state.stats.record_miss();
                return None;
            }
        };

        if expired {
            state.remove_entry(key);
            state.stats.record_miss();
            return None;
        }

        state.stats.record_hit();
        state.lru.touch(key);
        state.entries.get(key).map(|entry| entry.value.clone())
    }

    // == Peek ==
    /// Reads a live value without touching LRU order or statistics.
    pub fn peek(&self, key: &str) -> Option<V> {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(|entry| entry.value.clone())
    }

    // == Has ==
    /// Checks for a live entry without touching LRU order or statistics.
    pub fn has(&self, key: &str) -> bool {
        let state = self.state.lock();
        state
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    // == Delete ==
    /// Removes an entry, returning whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        self.state.lock().remove_entry(key).is_some()
    }

    // == Delete Matching ==
    /// Removes every live key matching `pattern`, returning the count removed.
    pub fn delete_matching(&self, pattern: &Regex) -> usize {
        let mut state = self.state.lock();
        let matching: Vec<String> = state
            .entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired() && pattern.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &matching {
            state.remove_entry(key);
        }
        matching.len()
    }

    // == Clear ==
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.lru.clear();
        state.current_size = 0;
    }

    // == Keys ==
    /// Returns live keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .lru
            .iter()
            .filter(|key| {
                state
                    .entries
                    .get(key.as_str())
                    .is_some_and(|entry| !entry.is_expired())
            })
            .cloned()
            .collect()
    }

    // == Prune ==
    /// Removes all expired entries, returning the number removed.
    pub fn prune(&self) -> usize {
        let mut state = self.state.lock();
        let expired: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            state.remove_entry(key);
        }
        expired.len()
    }

    // == Stats ==
    /// Returns a snapshot of the statistics.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let mut stats = state.stats.clone();
        stats.size = state.current_size;
        stats.entries = state.entries.len();
        stats
    }

    pub fn reset_stats(&self) {
        self.state.lock().stats.reset_counters();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn current_size(&self) -> usize {
        self.state.lock().current_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn notify_evicted(&self, evicted: Vec<(String, V)>) {
        if evicted.is_empty() {
            return;
        }
        debug!("Evicted {} entries to stay within budget", evicted.len());
        if let Some(callback) = &self.on_evict {
            for (key, value) in &evicted {
                callback(key, value);
            }
        }
    }
}
