// crates/mesaplane-core/src/core/error.rs
// ============================================================================
// Module: Mesaplane Error Taxonomy
// Description: The small, stable error taxonomy every surfaced error collapses into.
// Purpose: Keep handlers from ever seeing a raw database or RPC error.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every subsystem (`StoreError`, `ExecutorError`, `PluginError`, ...) defines
//! its own `thiserror` enum close to its own failure modes, then converts
//! into [`ApiError`] at the point it crosses into the Request Layer. No
//! `ApiError` variant ever carries a bare database or transport message;
//! `Internal` carries a correlation id for the client and the real detail is
//! logged server-side only.

use thiserror::Error;

// ============================================================================
// SECTION: Taxonomy
// ============================================================================

/// The stable error taxonomy surfaced to REST clients.
///
/// # Invariants
/// - Every variant maps to exactly one HTTP status at the Request Layer.
/// - `message` is a stable, client-safe string; never a passthrough of a
///   collaborator's raw error text.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input violates a constraint; never retried.
    #[error("validation error: {message}")]
    Validation {
        /// Client-safe description of the violated constraint.
        message: String,
    },
    /// Referenced entity does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// Client-safe description of what was not found.
        message: String,
    },
    /// Unique-key or state-machine violation.
    #[error("conflict: {message}")]
    Conflict {
        /// Client-safe description of the conflict.
        message: String,
    },
    /// Missing or invalid credentials.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Client-safe description.
        message: String,
    },
    /// Authenticated but not permitted.
    #[error("forbidden: {message}")]
    Forbidden {
        /// Client-safe description.
        message: String,
    },
    /// Request body or upload exceeded a size cap.
    #[error("payload too large: {message}")]
    PayloadTooLarge {
        /// Client-safe description, including the cap that was exceeded.
        message: String,
    },
    /// Client exceeded its rate-limit bucket.
    #[error("rate limited, retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds until the bucket refills.
        retry_after_seconds: u64,
    },
    /// Temporary downstream failure; safe to retry.
    #[error("transient error: {message}")]
    Transient {
        /// Client-safe description.
        message: String,
    },
    /// Unexpected failure; detail is opaque to the client and logged instead.
    #[error("internal error (correlation_id={correlation_id})")]
    Internal {
        /// Correlation id the client can hand back to operators.
        correlation_id: String,
    },
}

impl ApiError {
    /// Returns the stable taxonomy code used in the JSON envelope.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::RateLimited { .. } => "rate_limited",
            Self::Transient { .. } => "transient",
            Self::Internal { .. } => "internal",
        }
    }

    /// Returns the HTTP status code this error maps to.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::Unauthorized { .. } => 401,
            Self::Forbidden { .. } => 403,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::PayloadTooLarge { .. } => 413,
            Self::RateLimited { .. } => 429,
            Self::Transient { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    /// Builds a validation error from a client-safe message.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into() }
    }

    /// Builds a not-found error from a client-safe message.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound { message: message.into() }
    }

    /// Builds a conflict error from a client-safe message.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict { message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_has_a_distinct_code_and_status() {
        let samples = [
            ApiError::validation("x"),
            ApiError::not_found("x"),
            ApiError::conflict("x"),
            ApiError::Unauthorized { message: "x".to_string() },
            ApiError::Forbidden { message: "x".to_string() },
            ApiError::PayloadTooLarge { message: "x".to_string() },
            ApiError::RateLimited { retry_after_seconds: 5 },
            ApiError::Transient { message: "x".to_string() },
            ApiError::Internal { correlation_id: "abc".to_string() },
        ];
        let mut codes: Vec<&str> = samples.iter().map(ApiError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), samples.len());
    }

    #[test]
    fn internal_error_display_never_leaks_detail() {
        let err = ApiError::Internal { correlation_id: "abc-123".to_string() };
        assert!(err.to_string().contains("abc-123"));
        assert!(!err.to_string().contains("panic"));
    }
}
