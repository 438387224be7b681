//! Tiered Cache - a layered application cache
//!
//! A size-bounded in-process LRU cache with TTLs, an optional shared Redis
//! tier, a manager that composes them with read-through and pattern
//! invalidation, caching strategies over a data source, and HTTP response
//! caching middleware.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod manager;
pub mod middleware;
pub mod models;
pub mod remote;
pub mod strategies;
pub mod tasks;
pub mod tier;

pub use api::AppState;
pub use cache::BoundedCache;
pub use config::{CacheConfig, Config};
pub use error::{CacheError, Result};
pub use keys::KeyGenerator;
pub use manager::CacheManager;
pub use remote::RemoteStore;
pub use strategies::CacheStrategy;
pub use tasks::spawn_prune_task;
pub use tier::CacheTier;
