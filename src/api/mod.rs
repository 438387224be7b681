//! API Module
//!
//! HTTP handlers and routing for the cache admin REST API.
//!
//! # Endpoints
//! - `PUT /cache` - Store a JSON value under a key
//! - `GET /cache/:key` - Retrieve a value by key
//! - `DELETE /cache/:key` - Delete a key
//! - `POST /cache/invalidate` - Delete keys matching glob patterns
//! - `GET /stats` - Get cache statistics
//! - `GET /health` - Health check endpoint
//! - `GET /demo/time` - Example route behind the HTTP response cache

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
