//! API Routes
//!
//! Configures the Axum router with the cache admin endpoints and the
//! HTTP-cached demo route.

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, demo_time_handler, get_handler, health_handler, invalidate_handler,
    set_handler, stats_handler, AppState,
};
use crate::middleware::http_cache_middleware;

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `PUT /cache` - Store a JSON value
/// - `GET /cache/:key` - Retrieve a value by key
/// - `DELETE /cache/:key` - Delete a key
/// - `POST /cache/invalidate` - Delete every key matching glob patterns
/// - `GET /stats` - Cache statistics per layer
/// - `GET /health` - Health check endpoint
/// - `GET /demo/time` - Served through the HTTP response cache
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let cached_routes = Router::new()
        .route("/demo/time", get(demo_time_handler))
        .layer(middleware::from_fn_with_state(
            state.http_cache.clone(),
            http_cache_middleware,
        ));

    Router::new()
        .route("/cache", put(set_handler))
        .route("/cache/invalidate", post(invalidate_handler))
        .route("/cache/:key", get(get_handler).delete(delete_handler))
        .route("/stats", get(stats_handler))
        .route("/health", get(health_handler))
        .merge(cached_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
