// crates/mesaplane-executors/src/lib.rs
// ============================================================================
// Module: Mesaplane Executors
// Description: Executor implementations: warm pool and plugin-delegating.
// Purpose: Give the Run Engine a Submit/GetStatus/StreamLogs/Cancel backend
//          without binding it to either a worker endpoint or a plugin.
// Dependencies: mesaplane-core, reqwest, tokio
// ============================================================================

//! ## Overview
//! Two [`mesaplane_core::Executor`] implementations live here: [`WarmExecutor`]
//! dispatches directly to a single long-lived worker endpoint, and
//! [`PluginExecutor`] delegates to a bound executor-slot plugin, falling back
//! to a warm executor when the plugin is unhealthy. Both revalidate outbound
//! endpoints against [`net::EndpointPolicy`] on every call. [`HttpCatalogClient`]
//! and [`HttpObjectStore`] give Bootstrap the same treatment for the catalog
//! and blob-storage collaborators.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod catalog;
pub mod net;
pub mod objects;
pub mod plugin;
pub mod warm;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use catalog::HttpCatalogClient;
pub use net::EndpointPolicy;
pub use objects::HttpObjectStore;
pub use plugin::ExecutorPlugin;
pub use plugin::NullExecutorPlugin;
pub use plugin::PluginExecutor;
pub use warm::WarmExecutor;
pub use warm::WarmExecutorConfig;
