//! Error types for the cache
//!
//! Provides unified error handling using thiserror.
//!
//! Cache tiers themselves never fail: an unreachable remote store degrades to
//! misses. Errors surface only from misconfiguration, from the data-source
//! callbacks handed to the strategies, and from the HTTP API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A component was constructed with missing or out-of-range options
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The authoritative data source (fetcher or writer) failed
    #[error("Data source error: {0}")]
    Source(#[from] anyhow::Error),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CacheError::Serialization(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CacheError::Source(_) => StatusCode::BAD_GATEWAY,
            CacheError::Configuration(_) | CacheError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (CacheError::NotFound("k".into()), StatusCode::NOT_FOUND),
            (CacheError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (
                CacheError::Source(anyhow::anyhow!("db down")),
                StatusCode::BAD_GATEWAY,
            ),
            (
                CacheError::Configuration("missing writer".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }

    #[test]
    fn test_display_messages() {
        let error = CacheError::Configuration("data_writer is required".into());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: data_writer is required"
        );

        let error: CacheError = anyhow::anyhow!("timeout").into();
        assert_eq!(error.to_string(), "Data source error: timeout");
    }
}
