// crates/mesaplane-server/src/routes/files.rs
// ============================================================================
// Module: File Routes
// Description: Direct read/write/delete/list against the object store, for
//              pipeline code and other non-landing blobs.
// Purpose: Expose `ObjectStore` over REST without a domain entity wrapping
//          every object; the path itself is the identifier.
// Dependencies: axum, base64, mesaplane-core
// ============================================================================

//! ## Overview
//! Every handler validates its path with
//! [`mesaplane_core::validate_object_path`] before touching the store, so a
//! traversal attempt is rejected as `validation` before it reaches the
//! backend. There is no size cap enforced here beyond the Request Layer's
//! global JSON body limit for `write`'s inline-bytes body; bulk uploads
//! belong to the Landing route group's multipart path instead.

use axum::Json;
use axum::Router;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct PathQuery {
    path: String,
}

#[derive(Debug, Deserialize)]
struct PrefixQuery {
    #[serde(default)]
    prefix: String,
}

#[derive(Debug, Deserialize)]
struct WriteRequest {
    path: String,
    /// Base64-encoded object bytes.
    content: String,
}

#[derive(Debug, Serialize)]
struct ReadBody {
    path: String,
    /// Base64-encoded object bytes.
    content: String,
}

#[derive(Debug, Serialize)]
struct ListBody {
    keys: Vec<String>,
}

/// Builds the `/api/v1/files` route group.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/files", get(read).post(write).delete(delete_one))
        .route("/api/v1/files/list", get(list))
}

async fn read(State(state): State<AppState>, Query(query): Query<PathQuery>) -> Result<Json<ReadBody>, ApiError> {
    mesaplane_core::validate_object_path(&query.path)?;
    let bytes = state.object_store.read(&query.path).await?;
    Ok(Json(ReadBody { path: query.path, content: BASE64.encode(bytes) }))
}

async fn write(
    State(state): State<AppState>,
    request: Result<Json<WriteRequest>, JsonRejection>,
) -> Result<(), ApiError> {
    let Json(request) = request?;
    mesaplane_core::validate_object_path(&request.path)?;
    let bytes = BASE64.decode(&request.content).map_err(|err| ApiError::validation(format!("content is not valid base64: {err}")))?;
    state.object_store.write(&request.path, bytes).await?;
    Ok(())
}

async fn delete_one(State(state): State<AppState>, Query(query): Query<PathQuery>) -> Result<(), ApiError> {
    mesaplane_core::validate_object_path(&query.path)?;
    state.object_store.delete(&query.path).await?;
    Ok(())
}

async fn list(State(state): State<AppState>, Query(query): Query<PrefixQuery>) -> Result<Json<ListBody>, ApiError> {
    let keys = state.object_store.list(&query.prefix).await?;
    Ok(Json(ListBody { keys }))
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use super::*;

    #[test]
    fn base64_round_trips_arbitrary_bytes() {
        let original = b"mesaplane landing zone sample bytes, including \x00\x01\x02";
        let encoded = BASE64.encode(original);
        let decoded = BASE64.decode(encoded).expect("decode");
        assert_eq!(decoded, original);
    }

    #[test]
    fn base64_decode_rejects_invalid_alphabet() {
        assert!(BASE64.decode("not base64!!").is_err());
    }
}
