//! Response DTOs for the cache admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;
use serde_json::Value;

use crate::cache::CacheStats;
use crate::manager::ManagerStats;
use crate::remote::RemoteStats;

/// Response body for GET /cache/:key
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for PUT /cache
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for DELETE /cache/:key
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub message: String,
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for POST /cache/invalidate
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    pub message: String,
    pub patterns: Vec<String>,
}

impl InvalidateResponse {
    pub fn new(patterns: Vec<String>) -> Self {
        Self {
            message: format!("Invalidated {} pattern(s)", patterns.len()),
            patterns,
        }
    }
}

/// Response body for GET /stats
///
/// Layers that are not configured are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<CacheStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteStats>,
    /// Local hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

impl From<ManagerStats> for StatsResponse {
    fn from(stats: ManagerStats) -> Self {
        let hit_rate = stats.local.as_ref().map(CacheStats::hit_rate).unwrap_or(0.0);
        Self {
            local: stats.local,
            remote: stats.remote,
            hit_rate,
        }
    }
}

/// Response body for GET /health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Whether the remote tier currently holds a live connection; omitted
    /// when no remote tier is configured. The cache keeps serving either way.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_connected: Option<bool>,
}

impl HealthResponse {
    pub fn healthy(remote_connected: Option<bool>) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            remote_connected,
        }
    }
}
