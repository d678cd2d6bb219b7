// crates/mesaplane-server/src/error.rs
// ============================================================================
// Module: Request Layer Error Envelope
// Description: Wraps `mesaplane_core::ApiError` in an axum `IntoResponse`
//              and converts every collaborator error type into it.
// Purpose: Guarantee every error leaving this crate is the `{code, message,
//          details?}` JSON envelope from the taxonomy; never a raw
//          collaborator error or a plain-text body.
// Dependencies: mesaplane-core, mesaplane-engine, axum, serde_json
// ============================================================================

//! ## Overview
//! [`ApiError`] is a thin newtype over [`mesaplane_core::ApiError`] so this
//! crate can implement `axum::response::IntoResponse` for it without
//! violating the orphan rule. Every `From` impl below classifies a
//! collaborator error into the taxonomy exactly once, at the point it
//! crosses into the Request Layer; handlers never match on a collaborator
//! error variant themselves.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use mesaplane_core::CatalogError;
use mesaplane_core::ExecutorError;
use mesaplane_core::ObjectStoreError;
use mesaplane_core::SlugError;
use mesaplane_core::StoreError;
use mesaplane_engine::EngineError;
use mesaplane_engine::SchedulerError;
use mesaplane_engine::TriggerMatchError;
use serde::Serialize;

/// The error envelope returned by every handler in this crate.
#[derive(Debug)]
pub struct ApiError(pub mesaplane_core::ApiError);

/// Wire shape of the `{code, message, details?}` envelope.
#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl ApiError {
    /// Builds a `validation` error from a client-safe message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self(mesaplane_core::ApiError::validation(message))
    }

    /// Builds a `not_found` error from a client-safe message.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self(mesaplane_core::ApiError::not_found(message))
    }

    /// Builds a `payload_too_large` error naming the cap that was exceeded.
    #[must_use]
    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self(mesaplane_core::ApiError::PayloadTooLarge { message: message.into() })
    }

    /// Builds an `unauthorized` error from a client-safe message.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self(mesaplane_core::ApiError::Unauthorized { message: message.into() })
    }

    /// Builds a `forbidden` error from a client-safe message.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self(mesaplane_core::ApiError::Forbidden { message: message.into() })
    }

    /// Builds a `rate_limited` error carrying the refill hint.
    #[must_use]
    pub const fn rate_limited(retry_after_seconds: u64) -> Self {
        Self(mesaplane_core::ApiError::RateLimited { retry_after_seconds })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = if let mesaplane_core::ApiError::RateLimited { retry_after_seconds } = &self.0 {
            Some(serde_json::json!({ "retry_after_seconds": retry_after_seconds }))
        } else {
            None
        };
        let body = ErrorBody { code: self.0.code(), message: self.0.to_string(), details };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let inner = match err {
            StoreError::NotFound(message) => mesaplane_core::ApiError::not_found(message),
            StoreError::Conflict(message) => mesaplane_core::ApiError::conflict(message),
            StoreError::Violation(message) => mesaplane_core::ApiError::validation(message),
            StoreError::Transient(message) => mesaplane_core::ApiError::Transient { message },
            StoreError::Internal(message) => {
                tracing::error!(error = %message, "store internal error");
                mesaplane_core::ApiError::Internal { correlation_id: uuid::Uuid::new_v4().to_string() }
            }
        };
        Self(inner)
    }
}

impl From<ExecutorError> for ApiError {
    fn from(err: ExecutorError) -> Self {
        let inner = match err {
            ExecutorError::Unreachable(message) | ExecutorError::Timeout(_) => {
                mesaplane_core::ApiError::Transient { message: err.to_string() }
            }
            ExecutorError::Rejected(message) => mesaplane_core::ApiError::conflict(message),
        };
        Self(inner)
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let inner = match err {
            EngineError::Store(store_err) => return store_err.into(),
            EngineError::Executor(executor_err) => return executor_err.into(),
            EngineError::NotFound(run_id) => mesaplane_core::ApiError::not_found(format!("run {run_id} not found")),
            EngineError::AlreadyTerminal(run_id) => {
                mesaplane_core::ApiError::conflict(format!("run {run_id} is already terminal"))
            }
        };
        Self(inner)
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<TriggerMatchError> for ApiError {
    fn from(err: TriggerMatchError) -> Self {
        match err {
            TriggerMatchError::Store(store_err) => store_err.into(),
        }
    }
}

impl From<ObjectStoreError> for ApiError {
    fn from(err: ObjectStoreError) -> Self {
        let inner = match err {
            ObjectStoreError::NotFound(message) => mesaplane_core::ApiError::not_found(message),
            ObjectStoreError::InvalidPath(message) => mesaplane_core::ApiError::validation(message),
            ObjectStoreError::Backend(message) => {
                tracing::error!(error = %message, "object store backend error");
                mesaplane_core::ApiError::Transient { message: "object store unavailable".to_string() }
            }
        };
        Self(inner)
    }
}

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        tracing::error!(error = %err, "catalog backend error");
        Self(mesaplane_core::ApiError::Transient { message: "catalog service unavailable".to_string() })
    }
}

impl From<SlugError> for ApiError {
    fn from(err: SlugError) -> Self {
        Self(mesaplane_core::ApiError::validation(err.to_string()))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self(mesaplane_core::ApiError::validation(err.body_text()))
    }
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
    fn store_not_found_maps_to_404() {
        let api_error: ApiError = StoreError::NotFound("pipeline missing".to_string()).into();
        assert_eq!(api_error.0.http_status(), 404);
        assert_eq!(api_error.0.code(), "not_found");
    }

    #[test]
    fn store_internal_never_leaks_raw_message_in_code() {
        let api_error: ApiError = StoreError::Internal("disk full".to_string()).into();
        assert_eq!(api_error.0.code(), "internal");
    }

    #[test]
    fn engine_already_terminal_maps_to_conflict() {
        let run_id = mesaplane_core::RunId::new();
        let api_error: ApiError = EngineError::AlreadyTerminal(run_id).into();
        assert_eq!(api_error.0.code(), "conflict");
    }
}
