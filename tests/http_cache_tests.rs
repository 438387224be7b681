//! Integration Tests for the HTTP response cache
//!
//! Mounts the middleware in front of counting handlers and checks the
//! HIT / MISS / STALE transitions and the response headers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    middleware,
    response::Response,
    routing::{get, post},
    Router,
};
use tiered_cache::middleware::{http_cache_middleware, HttpCache, HttpCacheConfig};
use tiered_cache::CacheManager;
use tower::ServiceExt;

// == Helper Functions ==

fn counting_app(config: HttpCacheConfig) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let manager = Arc::new(CacheManager::memory_only(
        1024 * 1024,
        Duration::from_secs(300),
    ));

    let page_calls = calls.clone();
    let missing_calls = calls.clone();
    let account_calls = calls.clone();
    let report_calls = calls.clone();
    let app = Router::new()
        .route(
            "/page",
            get(move || {
                let calls = page_calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    ([(header::CONTENT_TYPE, "text/plain")], format!("render {}", n))
                }
            }),
        )
        .route(
            "/missing",
            get(move || {
                let calls = missing_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    StatusCode::NOT_FOUND
                }
            }),
        )
        .route("/submit", post(|| async { "accepted" }))
        .route(
            "/account",
            get(move || {
                let calls = account_calls.clone();
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    (
                        [
                            (header::SET_COOKIE, format!("session=user{}", n)),
                            (header::CACHE_CONTROL, "private, no-store".to_string()),
                        ],
                        format!("account {}", n),
                    )
                }
            }),
        )
        .route(
            "/report",
            get(move || {
                let calls = report_calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    ([(header::CONTENT_LENGTH, "13")], "quarterly sum")
                }
            }),
        )
        .layer(middleware::from_fn_with_state(
            HttpCache::new(manager, config),
            http_cache_middleware,
        ));

    (app, calls)
}

fn fresh_config() -> HttpCacheConfig {
    HttpCacheConfig {
        max_age: Duration::from_secs(60),
        stale_while_revalidate: Duration::from_secs(30),
        ..Default::default()
    }
}

fn request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> Response {
    app.clone().oneshot(request).await.unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn x_cache(response: &Response) -> &str {
    response.headers()["x-cache"].to_str().unwrap()
}

// == Hit / Miss ==

#[tokio::test]
async fn test_second_request_is_a_hit() {
    let (app, calls) = counting_app(fresh_config());

    let first = send(&app, request("/page")).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(body_text(first).await, "render 1");

    let second = send(&app, request("/page")).await;
    assert_eq!(x_cache(&second), "HIT");
    assert_eq!(second.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body_text(second).await, "render 1");

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cache_headers() {
    let (app, _) = counting_app(HttpCacheConfig {
        cdn_max_age: Duration::from_secs(600),
        ..fresh_config()
    });

    let response = send(&app, request("/page")).await;
    let headers = response.headers();

    assert_eq!(
        headers[header::CACHE_CONTROL],
        "public, max-age=60, stale-while-revalidate=30"
    );
    assert_eq!(headers["cdn-cache-control"], "max-age=600");
    assert!(headers[header::ETAG].to_str().unwrap().starts_with("W/\""));
}

#[tokio::test]
async fn test_query_string_is_part_of_the_key() {
    let (app, calls) = counting_app(fresh_config());

    send(&app, request("/page?lang=en")).await;
    let other = send(&app, request("/page?lang=fr")).await;

    assert_eq!(x_cache(&other), "MISS");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

// == Conditional Requests ==

#[tokio::test]
async fn test_matching_etag_returns_not_modified() {
    let (app, _) = counting_app(fresh_config());

    let first = send(&app, request("/page")).await;
    let etag = first.headers()[header::ETAG].clone();

    let conditional = Request::builder()
        .uri("/page")
        .header(header::IF_NONE_MATCH, etag.clone())
        .body(Body::empty())
        .unwrap();
    let response = send(&app, conditional).await;

    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(response.headers()[header::ETAG], etag);
    assert_eq!(x_cache(&response), "HIT");
    assert!(body_text(response).await.is_empty());
}

#[tokio::test]
async fn test_different_etag_returns_full_body() {
    let (app, _) = counting_app(fresh_config());
    send(&app, request("/page")).await;

    let conditional = Request::builder()
        .uri("/page")
        .header(header::IF_NONE_MATCH, "W/\"00000000\"")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, conditional).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "render 1");
}

#[tokio::test]
async fn test_no_cache_request_bypasses_lookup() {
    let (app, calls) = counting_app(fresh_config());
    send(&app, request("/page")).await;

    let bypass = Request::builder()
        .uri("/page")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, bypass).await;
    assert_eq!(x_cache(&response), "MISS");
    assert_eq!(body_text(response).await, "render 2");

    // The bypassing response replaced the stored copy
    let response = send(&app, request("/page")).await;
    assert_eq!(x_cache(&response), "HIT");
    assert_eq!(body_text(response).await, "render 2");
}

// == Stale-While-Revalidate ==

#[tokio::test]
async fn test_stale_response_served_while_refreshing() {
    let (app, calls) = counting_app(HttpCacheConfig {
        max_age: Duration::ZERO,
        stale_while_revalidate: Duration::from_secs(60),
        ..Default::default()
    });

    let first = send(&app, request("/page")).await;
    assert_eq!(x_cache(&first), "MISS");

    let stale = send(&app, request("/page")).await;
    assert_eq!(x_cache(&stale), "STALE");
    assert_eq!(body_text(stale).await, "render 1");

    // Let the background revalidation finish
    for _ in 0..50 {
        if calls.load(Ordering::SeqCst) >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let refreshed = send(&app, request("/page")).await;
    assert_eq!(x_cache(&refreshed), "STALE");
    assert_eq!(body_text(refreshed).await, "render 2");
}

// == Uncacheable Responses ==

#[tokio::test]
async fn test_error_responses_are_not_stored() {
    let (app, calls) = counting_app(fresh_config());

    let first = send(&app, request("/missing")).await;
    assert_eq!(first.status(), StatusCode::NOT_FOUND);
    assert_eq!(x_cache(&first), "MISS");
    assert!(first.headers().get(header::ETAG).is_none());

    let second = send(&app, request("/missing")).await;
    assert_eq!(x_cache(&second), "MISS");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_large_bodies_pass_through() {
    let (app, calls) = counting_app(HttpCacheConfig {
        max_body_bytes: 4,
        ..fresh_config()
    });

    let first = send(&app, request("/page")).await;
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(body_text(first).await, "render 1");

    let second = send(&app, request("/page")).await;
    assert_eq!(x_cache(&second), "MISS");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_private_responses_are_not_shared() {
    let (app, calls) = counting_app(fresh_config());

    let first = send(&app, request("/account")).await;
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(first.headers()[header::SET_COOKIE], "session=user1");
    assert_eq!(first.headers()[header::CACHE_CONTROL], "private, no-store");
    assert!(first.headers().get(header::ETAG).is_none());

    let second = send(&app, request("/account")).await;
    assert_eq!(x_cache(&second), "MISS");
    assert_eq!(second.headers()[header::SET_COOKIE], "session=user2");
    assert_eq!(body_text(second).await, "account 2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_declared_large_body_streams_through() {
    let (app, calls) = counting_app(HttpCacheConfig {
        max_body_bytes: 4,
        ..fresh_config()
    });

    let first = send(&app, request("/report")).await;
    assert_eq!(x_cache(&first), "MISS");
    assert_eq!(first.headers()[header::CONTENT_LENGTH], "13");
    assert_eq!(body_text(first).await, "quarterly sum");

    let second = send(&app, request("/report")).await;
    assert_eq!(x_cache(&second), "MISS");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_other_methods_pass_through() {
    let (app, _) = counting_app(fresh_config());

    let request = Request::builder()
        .method("POST")
        .uri("/submit")
        .body(Body::empty())
        .unwrap();
    let response = send(&app, request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get("x-cache").is_none());
}
