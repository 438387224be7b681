//! HTTP response caching middleware
//!
//! Caches successful GET/HEAD responses in a [`CacheManager`] and serves them
//! back with `Cache-Control`, `CDN-Cache-Control`, `ETag` and `X-Cache`
//! headers. Stale records inside the stale-while-revalidate window are served
//! immediately while a background request refreshes them.
//!
//! Wire it with `axum::middleware::from_fn_with_state(cache, http_cache_middleware)`.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::cache::current_timestamp_ms;
use crate::keys::KeyGenerator;
use crate::manager::CacheManager;

pub const X_CACHE: &str = "x-cache";
pub const CDN_CACHE_CONTROL: &str = "cdn-cache-control";

/// Response headers owned by the cache; never copied into a stored record.
const MANAGED_HEADERS: [&str; 6] = [
    "cache-control",
    CDN_CACHE_CONTROL,
    "etag",
    X_CACHE,
    "content-length",
    "set-cookie",
];

/// Upstream `Cache-Control` directives that forbid a shared copy.
const PRIVATE_DIRECTIVES: [&str; 2] = ["no-store", "private"];

#[derive(Debug, Clone)]
pub struct HttpCacheConfig {
    /// How long a stored response is served as fresh.
    pub max_age: Duration,
    /// How long past `max_age` a response may still be served while refreshing.
    pub stale_while_revalidate: Duration,
    /// Advertised to shared caches through `CDN-Cache-Control`.
    pub cdn_max_age: Duration,
    /// Larger bodies pass through uncached.
    pub max_body_bytes: usize,
    pub key_prefix: String,
}

impl Default for HttpCacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::from_secs(60),
            stale_while_revalidate: Duration::from_secs(30),
            cdn_max_age: Duration::from_secs(300),
            max_body_bytes: 1024 * 1024,
            key_prefix: "http".to_string(),
        }
    }
}

impl HttpCacheConfig {
    fn retention(&self) -> Duration {
        self.max_age + self.stale_while_revalidate
    }

    fn cache_control(&self) -> String {
        format!(
            "public, max-age={}, stale-while-revalidate={}",
            self.max_age.as_secs(),
            self.stale_while_revalidate.as_secs()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Stale,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Stale => "STALE",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// A response as stored in the cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    /// Base64
    body: String,
    etag: String,
    /// Unix milliseconds
    stored_at: u64,
}

impl CachedResponse {
    fn new(status: StatusCode, headers: &HeaderMap, body: &[u8], etag: String) -> Self {
        let headers = headers
            .iter()
            .filter(|(name, _)| !MANAGED_HEADERS.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        Self {
            status: status.as_u16(),
            headers,
            body: STANDARD.encode(body),
            etag,
            stored_at: current_timestamp_ms(),
        }
    }

    fn age(&self) -> Duration {
        Duration::from_millis(current_timestamp_ms().saturating_sub(self.stored_at))
    }

    fn into_response(self, body: Vec<u8>) -> Response {
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.append(name, value);
            }
        }
        response
    }
}

/// Weak validator derived from the body checksum.
pub fn weak_etag(body: &[u8]) -> String {
    format!("W/\"{:08x}\"", crc32fast::hash(body))
}

fn etag_matches(if_none_match: &str, etag: &str) -> bool {
    if_none_match
        .split(',')
        .map(str::trim)
        .any(|candidate| candidate == "*" || candidate == etag)
}

fn header_str<'a>(headers: &'a HeaderMap, name: impl header::AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Shared state for [`http_cache_middleware`].
#[derive(Clone)]
pub struct HttpCache {
    manager: Arc<CacheManager>,
    config: Arc<HttpCacheConfig>,
    keys: KeyGenerator,
    /// Keys with a background revalidation in progress.
    refreshing: Arc<DashMap<String, ()>>,
}

impl HttpCache {
    pub fn new(manager: Arc<CacheManager>, config: HttpCacheConfig) -> Self {
        let keys = KeyGenerator::new(config.key_prefix.clone());
        Self {
            manager,
            config: Arc::new(config),
            keys,
            refreshing: Arc::new(DashMap::new()),
        }
    }

    pub fn config(&self) -> &HttpCacheConfig {
        &self.config
    }

    /// Method, path, query and `Accept` identify a cached response.
    pub fn request_key(&self, req: &Request<Body>) -> String {
        let uri = req.uri();
        self.keys.key(&[
            json!(req.method().as_str()),
            json!(uri.path()),
            json!(uri.query().unwrap_or("")),
            json!(header_str(req.headers(), header::ACCEPT).unwrap_or("")),
        ])
    }

    async fn lookup(&self, key: &str) -> Option<(CachedResponse, Vec<u8>)> {
        let raw = self.manager.get(key).await?;
        let record: CachedResponse = match serde_json::from_value(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!("Discarding unreadable cached response at '{}': {}", key, e);
                return None;
            }
        };
        match STANDARD.decode(&record.body) {
            Ok(body) => Some((record, body)),
            Err(e) => {
                warn!("Discarding cached response with bad body at '{}': {}", key, e);
                None
            }
        }
    }

    /// Stores a successful response and returns it with cache headers applied.
    async fn store(&self, key: &str, response: Response) -> Response {
        if response.status() != StatusCode::OK || self.config.retention().is_zero() {
            return with_status_header(response, CacheStatus::Miss);
        }

        if let Some(reason) = uncacheable(response.headers(), self.config.max_body_bytes) {
            debug!("Not caching response for '{}': {}", key, reason);
            return with_status_header(response, CacheStatus::Miss);
        }

        let (mut parts, body) = response.into_parts();
        let bytes: Bytes = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to buffer response body for '{}': {}", key, e);
                return (StatusCode::BAD_GATEWAY, "failed to read upstream response")
                    .into_response();
            }
        };

        if bytes.len() > self.config.max_body_bytes {
            debug!("Response for '{}' too large to cache ({} bytes)", key, bytes.len());
            let response = Response::from_parts(parts, Body::from(bytes));
            return with_status_header(response, CacheStatus::Miss);
        }

        let etag = weak_etag(&bytes);
        let record = CachedResponse::new(parts.status, &parts.headers, &bytes, etag.clone());
        match serde_json::to_value(&record) {
            Ok(value) => {
                self.manager
                    .set(key, value, Some(self.config.retention()))
                    .await
            }
            Err(e) => warn!("Failed to encode response for '{}': {}", key, e),
        }

        parts.headers.remove(header::CONTENT_LENGTH);
        self.apply_headers(&mut parts.headers, &etag, CacheStatus::Miss);
        Response::from_parts(parts, Body::from(bytes))
    }

    fn serve(
        &self,
        record: CachedResponse,
        body: Vec<u8>,
        status: CacheStatus,
        if_none_match: Option<&str>,
    ) -> Response {
        let etag = record.etag.clone();
        let mut response = match if_none_match {
            Some(candidates) if etag_matches(candidates, &etag) => {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::NOT_MODIFIED;
                response
            }
            _ => record.into_response(body),
        };
        self.apply_headers(response.headers_mut(), &etag, status);
        response
    }

    fn apply_headers(&self, headers: &mut HeaderMap, etag: &str, status: CacheStatus) {
        if let Ok(value) = self.config.cache_control().parse() {
            headers.insert(header::CACHE_CONTROL, value);
        }
        if let Ok(value) = format!("max-age={}", self.config.cdn_max_age.as_secs()).parse() {
            headers.insert(CDN_CACHE_CONTROL, value);
        }
        if let Ok(value) = etag.parse() {
            headers.insert(header::ETAG, value);
        }
        headers.insert(X_CACHE, HeaderValue::from_static(status.as_str()));
    }

    /// Re-runs the request in the background unless a refresh is already running.
    fn revalidate(&self, key: String, req: Request<Body>, next: Next) {
        if self.refreshing.insert(key.clone(), ()).is_some() {
            return;
        }

        let cache = self.clone();
        tokio::spawn(async move {
            debug!("Revalidating '{}'", key);
            let response = next.run(req).await;
            if response.status() == StatusCode::OK {
                cache.store(&key, response).await;
            } else {
                debug!(
                    "Revalidation of '{}' returned {}, keeping stale copy",
                    key,
                    response.status()
                );
            }
            cache.refreshing.remove(&key);
        });
    }
}

fn with_status_header(mut response: Response, status: CacheStatus) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(status.as_str()));
    response
}

fn has_directive(headers: &HeaderMap, wanted: &str) -> bool {
    headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|directive| {
            let name = directive.split('=').next().unwrap_or("").trim();
            name.eq_ignore_ascii_case(wanted)
        })
}

fn is_no_cache(headers: &HeaderMap) -> bool {
    has_directive(headers, "no-cache")
}

/// Why an upstream response must not be stored, judged from its headers.
fn uncacheable(headers: &HeaderMap, max_body_bytes: usize) -> Option<&'static str> {
    if let Some(directive) = PRIVATE_DIRECTIVES
        .iter()
        .find(|directive| has_directive(headers, directive))
    {
        return Some(*directive);
    }
    if headers.contains_key(header::SET_COOKIE) {
        return Some("sets a cookie");
    }
    let declared_length = header_str(headers, header::CONTENT_LENGTH)
        .and_then(|value| value.parse::<usize>().ok());
    match declared_length {
        Some(length) if length > max_body_bytes => Some("body too large"),
        _ => None,
    }
}

/// Response caching for GET and HEAD. Other methods pass straight through.
pub async fn http_cache_middleware(
    State(cache): State<HttpCache>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        return next.run(req).await;
    }

    let key = cache.request_key(&req);

    if !is_no_cache(req.headers()) {
        if let Some((record, body)) = cache.lookup(&key).await {
            let if_none_match =
                header_str(req.headers(), header::IF_NONE_MATCH).map(str::to_string);
            let age = record.age();

            if age < cache.config.max_age {
                debug!("HTTP cache hit for '{}'", key);
                return cache.serve(record, body, CacheStatus::Hit, if_none_match.as_deref());
            }
            if age < cache.config.retention() {
                debug!("HTTP cache stale for '{}'", key);
                let response =
                    cache.serve(record, body, CacheStatus::Stale, if_none_match.as_deref());
                cache.revalidate(key, req, next);
                return response;
            }
        }
    }

    let response = next.run(req).await;
    cache.store(&key, response).await
}
