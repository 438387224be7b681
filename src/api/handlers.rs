//! API Handlers
//!
//! HTTP request handlers for each cache admin endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::manager::CacheManager;
use crate::middleware::{HttpCache, HttpCacheConfig};
use crate::models::{
    validate_key, DeleteResponse, GetResponse, HealthResponse, InvalidateRequest,
    InvalidateResponse, SetRequest, SetResponse, StatsResponse,
};

/// Application state shared across all handlers.
///
/// The manager synchronizes internally, so handlers share it through a plain `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    /// Response cache for the routes mounted behind the HTTP cache middleware
    pub http_cache: HttpCache,
}

impl AppState {
    pub fn new(cache: CacheManager) -> Self {
        Self::with_http_cache(cache, HttpCacheConfig::default())
    }

    pub fn with_http_cache(cache: CacheManager, config: HttpCacheConfig) -> Self {
        let cache = Arc::new(cache);
        Self {
            http_cache: HttpCache::new(cache.clone(), config),
            cache,
        }
    }

    /// Builds the layered cache described by the configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(CacheManager::from_config(&config.cache))
    }
}

fn check_key(key: &str) -> Result<()> {
    match validate_key(key) {
        Some(message) => Err(CacheError::InvalidRequest(message)),
        None => Ok(()),
    }
}

/// Handler for PUT /cache
///
/// Stores any JSON value under a key with an optional TTL.
pub async fn set_handler(
    State(state): State<AppState>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    let ttl = req.ttl();
    state.cache.set(&req.key, req.value, ttl).await;

    Ok(Json(SetResponse::new(req.key)))
}

/// Handler for GET /cache/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    check_key(&key)?;

    match state.cache.get(&key).await {
        Some(value) => Ok(Json(GetResponse::new(key, value))),
        None => Err(CacheError::NotFound(key)),
    }
}

/// Handler for DELETE /cache/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    check_key(&key)?;

    if state.cache.delete(&key).await {
        Ok(Json(DeleteResponse::new(key)))
    } else {
        Err(CacheError::NotFound(key))
    }
}

/// Handler for POST /cache/invalidate
///
/// Removes every key matching any of the glob patterns from all layers.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Json(req): Json<InvalidateRequest>,
) -> Result<Json<InvalidateResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }

    state.cache.invalidate(&req.patterns).await;

    Ok(Json(InvalidateResponse::new(req.patterns)))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.cache.stats().await.into())
}

/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let remote_connected = match state.cache.remote_store() {
        Some(store) => Some(store.is_connected().await),
        None => None,
    };
    Json(HealthResponse::healthy(remote_connected))
}

/// Handler for GET /demo/time
///
/// A deliberately uncached-looking payload, served behind the HTTP cache.
pub async fn demo_time_handler() -> Json<Value> {
    Json(json!({
        "time": chrono::Utc::now().to_rfc3339(),
    }))
}
