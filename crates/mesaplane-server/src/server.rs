// crates/mesaplane-server/src/server.rs
// ============================================================================
// Module: Request Layer Router Assembly
// Description: Builds the axum `Router` over `AppState`: trace-id
//              propagation, tracing, and per-route-group body size caps.
// Purpose: Give the Bootstrap & Supervisor component a single `Router` to
//          serve, with every cross-cutting concern already layered in.
// Dependencies: axum, tower, tower-http
// ============================================================================

//! ## Overview
//! [`build_router`] nests two sub-routers under `/api/v1`: the bulk of the
//! surface under the JSON body cap, and the landing-upload route under the
//! larger multipart cap, each with its own
//! `tower_http::limit::RequestBodyLimitLayer`. [`trace_id_layer`] assigns
//! every request a trace id (propagated to downstream RPC calls as
//! metadata, per the Request Layer contract) and echoes it back on the
//! `x-trace-id` response header. [`rate_limit_layer`] runs before both,
//! keying on the connecting peer address and rejecting with `rate_limited`
//! once [`crate::rate_limit::RateLimiter`] denies the request, so the limiter
//! actually gates traffic rather than only maintaining bucket state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::ConnectInfo;
use axum::extract::Request;
use axum::extract::State;
use axum::http::HeaderName;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::error::ApiError;
use crate::rate_limit::RateLimitDecision;
use crate::routes;
use crate::state::AppState;

/// Header carrying the per-request trace id, both inbound (if supplied by
/// a caller) and outbound on every response.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// Request-extension wrapper for the trace id, readable by any handler.
#[derive(Debug, Clone)]
pub struct TraceId(pub String);

/// Tunables for the SSE log stream and other request-scoped timers.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Heartbeat cadence for open SSE streams; must stay `<= 30s` per contract.
    pub sse_heartbeat: Duration,
    /// Soft maximum lifetime of an SSE stream before it is force-closed.
    pub sse_max_lifetime: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { sse_heartbeat: Duration::from_secs(15), sse_max_lifetime: Duration::from_secs(30 * 60) }
    }
}

/// Builds the full router over `state`. The caller must serve it with
/// [`axum::extract::connect_info::IntoMakeServiceWithConnectInfo`] (i.e.
/// `router.into_make_service_with_connect_info::<SocketAddr>()`), since
/// [`rate_limit_layer`] keys on the connecting peer address.
#[must_use]
pub fn build_router(state: AppState, config: ServerConfig) -> Router {
    let json_cap = state.max_json_body_bytes;
    let upload_cap = state.max_upload_body_bytes;

    let health = Router::new()
        .route("/health/live", get(routes::health::live))
        .route("/health/ready", get(routes::health::ready));

    let api = Router::new()
        .merge(routes::namespaces::router())
        .merge(routes::pipelines::router())
        .merge(routes::runs::router(config))
        .merge(routes::schedules::router())
        .merge(routes::triggers::router())
        .merge(routes::quality::router())
        .merge(routes::files::router())
        .route("/api/v1/features", get(routes::health::features))
        .layer(RequestBodyLimitLayer::new(json_cap));

    let uploads = routes::landing::router().layer(RequestBodyLimitLayer::new(upload_cap));

    let guarded = Router::new()
        .merge(api)
        .merge(uploads)
        .layer(axum::middleware::from_fn_with_state(state.clone(), rate_limit_layer));

    Router::new()
        .merge(health)
        .merge(guarded)
        .layer(axum::middleware::from_fn(trace_id_layer))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Assigns (or propagates) a trace id for the request and echoes it on the response.
async fn trace_id_layer(mut request: Request, next: Next) -> Response {
    let trace_id = request
        .headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(ToString::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    request.extensions_mut().insert(TraceId(trace_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert(HeaderName::from_static(TRACE_ID_HEADER), value);
    }
    response
}

/// Keys [`crate::rate_limit::RateLimiter`] on the connecting peer's IP and
/// rejects the request before it reaches a handler once the bucket is over
/// quota or the bucket map itself is over capacity.
async fn rate_limit_layer(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    match state.rate_limiter.check(&addr.ip().to_string()) {
        RateLimitDecision::Allow => next.run(request).await,
        RateLimitDecision::Limited { retry_after_ms } => {
            ApiError::rate_limited(retry_after_ms.div_ceil(1000)).into_response()
        }
        RateLimitDecision::OverCapacity => {
            ApiError(mesaplane_core::ApiError::Transient { message: "rate limiter at capacity".to_string() })
                .into_response()
        }
    }
}
