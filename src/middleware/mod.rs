//! Middleware Module
//!
//! HTTP response caching on top of the cache manager.

mod http_cache;

pub use http_cache::{
    http_cache_middleware, weak_etag, CacheStatus, HttpCache, HttpCacheConfig, CDN_CACHE_CONTROL,
    X_CACHE,
};
