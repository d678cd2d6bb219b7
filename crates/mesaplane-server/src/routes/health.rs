// crates/mesaplane-server/src/routes/health.rs
// ============================================================================
// Module: Health & Capability Routes
// Description: Liveness/readiness probes and the feature-capability probe.
// Purpose: Let an orchestrator and the IDE both ask "is this process usable
//          right now" without touching any domain endpoint.
// Dependencies: axum, mesaplane-core
// ============================================================================

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

/// Always returns success once the process is accepting connections.
pub async fn live() -> &'static str {
    "ok"
}

/// Returns success only when the Store reports readiness.
///
/// # Errors
///
/// Returns [`ApiError::Transient`] when the Store is not ready.
pub async fn ready(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state.store.readiness().await?;
    Ok("ok")
}

/// Capability probe body.
#[derive(Debug, Serialize)]
struct Features {
    executor_implementation: &'static str,
    open_log_streams: u64,
}

/// Reports the active executor implementation and current SSE load.
pub async fn features(State(state): State<AppState>) -> Json<Features> {
    Json(Features {
        executor_implementation: state.engine_executor_label(),
        open_log_streams: state.open_streams.load(std::sync::atomic::Ordering::Relaxed),
    })
}
