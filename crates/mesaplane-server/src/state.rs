// crates/mesaplane-server/src/state.rs
// ============================================================================
// Module: Request Layer Application State
// Description: Shared handles every route handler borrows: collaborators,
//              the Run Engine, the rate limiter, and open-SSE-stream count.
// Purpose: Give axum a single `Clone`-cheap state type without handlers
//          reaching for module-level globals.
// Dependencies: mesaplane-core, mesaplane-engine, mesaplane-executors, tokio
// ============================================================================

//! ## Overview
//! [`AppState`] is built once at bootstrap and cloned per request by axum
//! (every field is an `Arc` or `Copy`, so the clone is cheap). `open_streams`
//! is the backpressure counter the SSE log handler increments on open and
//! decrements on close, read by the `/api/v1/features` probe and by a
//! future admission-control check (§9's backpressure note; not yet a hard
//! cap in this build).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicU64;

use mesaplane_core::CatalogClient;
use mesaplane_core::MetadataStore;
use mesaplane_core::ObjectStore;
use mesaplane_engine::RunEngine;
use mesaplane_engine::TriggerEvaluator;
use mesaplane_executors::PluginExecutor;

use crate::rate_limit::RateLimiter;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    /// Metadata store handle.
    pub store: Arc<dyn MetadataStore>,
    /// Object store handle, for the Files and Landing route groups.
    pub object_store: Arc<dyn ObjectStore>,
    /// Catalog client handle, exposed read-only through the Query group.
    pub catalog: Arc<dyn CatalogClient>,
    /// Run Engine, monomorphized over the plugin-delegating executor.
    pub engine: Arc<RunEngine<PluginExecutor>>,
    /// The executor the engine dispatches through, held separately so the
    /// log-stream handler and the feature probe can call it directly.
    pub executor: Arc<PluginExecutor>,
    /// Matches inbound webhook POSTs (and other events) against enabled
    /// triggers, for the webhook-receive endpoint.
    pub trigger_evaluator: Arc<TriggerEvaluator<PluginExecutor>>,
    /// Per-client rate limiter.
    pub rate_limiter: Arc<RateLimiter>,
    /// Count of currently open SSE log streams.
    pub open_streams: Arc<AtomicU64>,
    /// Hard cap on JSON request bodies, in bytes.
    pub max_json_body_bytes: usize,
    /// Hard cap on multipart upload bodies, in bytes.
    pub max_upload_body_bytes: usize,
}

impl AppState {
    /// Builds application state over its collaborators, with fresh rate
    /// limiter and stream-counter state.
    #[must_use]
    pub fn new(
        store: Arc<dyn MetadataStore>,
        object_store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogClient>,
        engine: Arc<RunEngine<PluginExecutor>>,
        executor: Arc<PluginExecutor>,
        trigger_evaluator: Arc<TriggerEvaluator<PluginExecutor>>,
        rate_limiter: Arc<RateLimiter>,
        max_json_body_bytes: usize,
        max_upload_body_bytes: usize,
    ) -> Self {
        Self {
            store,
            object_store,
            catalog,
            engine,
            executor,
            trigger_evaluator,
            rate_limiter,
            open_streams: Arc::new(AtomicU64::new(0)),
            max_json_body_bytes,
            max_upload_body_bytes,
        }
    }

    /// Returns the stable label of the executor currently in use, for the
    /// `/api/v1/features` capability probe.
    #[must_use]
    pub fn engine_executor_label(&self) -> &'static str {
        mesaplane_core::Executor::implementation_label(self.executor.as_ref())
    }
}
