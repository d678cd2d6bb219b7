// crates/mesaplane-server/tests/router.rs
// ============================================================================
// Module: Request Layer Router Tests
// Description: Black-box tests driving the assembled axum Router through
//              `tower::ServiceExt::oneshot`, exactly as a real client would.
// Purpose: Cover health exemption from rate limiting, the fixed-window
//          limiter actually rejecting traffic, and the JSON error envelope
//          (including `JsonRejection` mapping) across real requests.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::connect_info::ConnectInfo;
use axum::http::Request;
use axum::http::StatusCode;
use mesaplane_core::CatalogBranch;
use mesaplane_core::CatalogClient;
use mesaplane_core::CatalogError;
use mesaplane_core::ObjectStore;
use mesaplane_core::ObjectStoreError;
use mesaplane_engine::RunEngine;
use mesaplane_engine::TriggerEvaluator;
use mesaplane_executors::EndpointPolicy;
use mesaplane_executors::NullExecutorPlugin;
use mesaplane_executors::PluginExecutor;
use mesaplane_executors::WarmExecutor;
use mesaplane_executors::WarmExecutorConfig;
use mesaplane_server::AppState;
use mesaplane_server::RateLimiter;
use mesaplane_server::RateLimiterConfig;
use mesaplane_server::ServerConfig;
use mesaplane_server::build_router;
use mesaplane_store_sqlite::SqliteMetadataStore;
use reqwest::Url;
use tower::ServiceExt;

struct EmptyObjectStore;

#[async_trait]
impl ObjectStore for EmptyObjectStore {
    async fn read(&self, _path: &str) -> Result<Vec<u8>, ObjectStoreError> {
        Err(ObjectStoreError::NotFound("unused".to_string()))
    }
    async fn write(&self, _path: &str, _bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        Ok(())
    }
    async fn delete(&self, _path: &str) -> Result<(), ObjectStoreError> {
        Ok(())
    }
    async fn list(&self, _prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
        Ok(Vec::new())
    }
}

struct EmptyCatalogClient;

#[async_trait]
impl CatalogClient for EmptyCatalogClient {
    async fn list_branches(&self, _prefix: &str) -> Result<Vec<CatalogBranch>, CatalogError> {
        Ok(Vec::new())
    }
    async fn delete_branch(&self, _branch_id: &str) -> Result<(), CatalogError> {
        Ok(())
    }
}

/// Builds a full `AppState` over a real tempfile-backed SQLite store. The
/// executor never actually dispatches in these tests, so the plugin slot is
/// bound to [`NullExecutorPlugin`] with a warm fallback pointed at an unused
/// placeholder URL (construction only validates the URL, it is never
/// connected to).
fn test_state(rate_limit: RateLimiterConfig) -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteMetadataStore::open(&dir.path().join("router-test.sqlite3"), 1).expect("open store"));

    let warm = WarmExecutor::new(WarmExecutorConfig {
        base_url: Url::parse("https://worker.invalid").expect("valid url"),
        timeout: std::time::Duration::from_secs(5),
        policy: EndpointPolicy::default(),
    })
    .expect("build warm executor");
    let executor = Arc::new(PluginExecutor::new(Arc::new(NullExecutorPlugin), warm));

    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Arc::new(RunEngine::new(
        Arc::clone(&store) as Arc<dyn mesaplane_core::MetadataStore>,
        Arc::clone(&executor),
        tx,
    ));
    let trigger_evaluator =
        Arc::new(TriggerEvaluator::new(Arc::clone(&store) as Arc<dyn mesaplane_core::MetadataStore>, Arc::clone(&engine)));

    let state = AppState::new(
        store as Arc<dyn mesaplane_core::MetadataStore>,
        Arc::new(EmptyObjectStore) as Arc<dyn mesaplane_core::ObjectStore>,
        Arc::new(EmptyCatalogClient) as Arc<dyn mesaplane_core::CatalogClient>,
        engine,
        executor,
        trigger_evaluator,
        Arc::new(RateLimiter::new(rate_limit)),
        1024 * 1024,
        64 * 1024 * 1024,
    );
    (state, dir)
}

fn request_from(addr: SocketAddr, method: &str, uri: &str, body: Body) -> Request<Body> {
    let mut request = Request::builder().method(method).uri(uri).header("content-type", "application/json").body(body).expect("build request");
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn health_live_is_exempt_from_rate_limiting() {
    let (state, _dir) = test_state(RateLimiterConfig { max_requests: 1, ..RateLimiterConfig::default() });
    let router = build_router(state, ServerConfig::default());
    let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();

    for _ in 0..5 {
        let response = router
            .clone()
            .oneshot(request_from(addr, "GET", "/health/live", Body::empty()))
            .await
            .expect("router call");
        assert_eq!(response.status(), StatusCode::OK, "liveness must never be rate-limited");
    }
}

#[tokio::test]
async fn repeated_requests_past_capacity_are_rate_limited_with_429() {
    let (state, _dir) =
        test_state(RateLimiterConfig { max_requests: 2, window_ms: 60_000, ..RateLimiterConfig::default() });
    let router = build_router(state, ServerConfig::default());
    let addr: SocketAddr = "127.0.0.1:9001".parse().unwrap();

    let first = router
        .clone()
        .oneshot(request_from(addr, "GET", "/api/v1/features", Body::empty()))
        .await
        .expect("first call");
    assert_eq!(first.status(), StatusCode::OK);

    let second = router
        .clone()
        .oneshot(request_from(addr, "GET", "/api/v1/features", Body::empty()))
        .await
        .expect("second call");
    assert_eq!(second.status(), StatusCode::OK);

    let third = router
        .clone()
        .oneshot(request_from(addr, "GET", "/api/v1/features", Body::empty()))
        .await
        .expect("third call");
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS, "a third request in the window must be rejected");

    let body = axum::body::to_bytes(third.into_body(), usize::MAX).await.expect("read body");
    let parsed: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(parsed["code"], "rate_limited");
}

#[tokio::test]
async fn a_different_client_address_gets_its_own_bucket() {
    let (state, _dir) = test_state(RateLimiterConfig { max_requests: 1, ..RateLimiterConfig::default() });
    let router = build_router(state, ServerConfig::default());
    let first_addr: SocketAddr = "127.0.0.1:9002".parse().unwrap();
    let second_addr: SocketAddr = "127.0.0.2:9003".parse().unwrap();

    let first = router
        .clone()
        .oneshot(request_from(first_addr, "GET", "/api/v1/features", Body::empty()))
        .await
        .expect("first client call");
    assert_eq!(first.status(), StatusCode::OK);

    let exhausted = router
        .clone()
        .oneshot(request_from(first_addr, "GET", "/api/v1/features", Body::empty()))
        .await
        .expect("first client second call");
    assert_eq!(exhausted.status(), StatusCode::TOO_MANY_REQUESTS);

    let second = router
        .clone()
        .oneshot(request_from(second_addr, "GET", "/api/v1/features", Body::empty()))
        .await
        .expect("second client call");
    assert_eq!(second.status(), StatusCode::OK, "a distinct peer address must not share the exhausted bucket");
}

#[tokio::test]
async fn malformed_json_body_is_rejected_through_the_error_envelope_not_a_panic() {
    let (state, _dir) = test_state(RateLimiterConfig::default());
    let router = build_router(state, ServerConfig::default());
    let addr: SocketAddr = "127.0.0.1:9004".parse().unwrap();

    let response = router
        .clone()
        .oneshot(request_from(addr, "POST", "/api/v1/pipelines", Body::from("not json")))
        .await
        .expect("router call");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("read body");
    let parsed: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(parsed["code"], "validation", "a JsonRejection must surface through the same envelope as a handler error");
}

#[tokio::test]
async fn pipeline_create_list_and_duplicate_conflict_round_trip() {
    let (state, _dir) = test_state(RateLimiterConfig::default());
    let router = build_router(state, ServerConfig::default());
    let addr: SocketAddr = "127.0.0.1:9005".parse().unwrap();

    let namespace_body = serde_json::json!({ "id": "acme" });
    let namespace_created = router
        .clone()
        .oneshot(request_from(addr, "POST", "/api/v1/namespaces", Body::from(namespace_body.to_string())))
        .await
        .expect("namespace create call");
    assert_eq!(namespace_created.status(), StatusCode::OK);

    let create_body = serde_json::json!({
        "namespace": "acme",
        "layer": "bronze",
        "name": "orders",
        "kind": "sql",
        "storage_prefix": "acme/bronze/orders",
    });

    let created = router
        .clone()
        .oneshot(request_from(addr, "POST", "/api/v1/pipelines", Body::from(create_body.to_string())))
        .await
        .expect("create call");
    assert_eq!(created.status(), StatusCode::OK);

    let duplicate = router
        .clone()
        .oneshot(request_from(addr, "POST", "/api/v1/pipelines", Body::from(create_body.to_string())))
        .await
        .expect("duplicate create call");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT, "duplicate (namespace, layer, name) must conflict");

    let listed = router
        .clone()
        .oneshot(request_from(addr, "GET", "/api/v1/pipelines?namespace=acme", Body::empty()))
        .await
        .expect("list call");
    assert_eq!(listed.status(), StatusCode::OK);
    let body = axum::body::to_bytes(listed.into_body(), usize::MAX).await.expect("read body");
    let parsed: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(parsed["total"], 1);
}
