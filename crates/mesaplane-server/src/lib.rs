// crates/mesaplane-server/src/lib.rs
// ============================================================================
// Module: Mesaplane Server
// Description: REST Request Layer: routing, validation, rate limiting, SSE
//              log streaming, and the JSON error envelope.
// Purpose: Terminate inbound HTTP and translate it into Store/Run Engine
//          calls without either collaborator knowing about HTTP.
// Dependencies: mesaplane-core, mesaplane-engine, mesaplane-executors, axum
// ============================================================================

//! ## Overview
//! [`server::build_router`] assembles the full `/api/v1` surface over
//! [`state::AppState`]. Every handler returns `Result<_, error::ApiError>`;
//! [`error::ApiError`] implements `axum::response::IntoResponse` and is the
//! only place an HTTP status is chosen from the taxonomy in
//! `mesaplane_core::ApiError`. [`rate_limit::RateLimiter`] and the open-SSE
//! stream counter in [`state::AppState`] are the two pieces of mutable
//! shared state a request handler touches outside of the Store/Engine
//! calls themselves.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod server;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::ApiError;
pub use rate_limit::RateLimitDecision;
pub use rate_limit::RateLimiter;
pub use rate_limit::RateLimiterConfig;
pub use server::build_router;
pub use server::ServerConfig;
pub use state::AppState;
