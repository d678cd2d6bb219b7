// crates/mesaplane-executors/src/plugin.rs
// ============================================================================
// Module: Plugin-Delegating Executor
// Description: Executor implementation that delegates to the executor slot,
//              falling back to a warm pool executor when the plugin is
//              unhealthy.
// Purpose: Let an operator swap dispatch onto a custom scheduler without
//          the Run Engine ever distinguishing the two implementations.
// Dependencies: mesaplane-core, mesaplane-executors::warm
// ============================================================================

//! ## Overview
//! The executor slot is the one plugin slot whose RPC surface *is* the
//! [`Executor`] trait itself, rather than a narrower slot-specific contract.
//! [`ExecutorPlugin`] composes [`PluginClient`] (for health) with [`Executor`]
//! (for dispatch) so a bound plugin can stand in wherever a warm executor
//! would otherwise run. [`PluginExecutor`] checks health before every call
//! and falls back to the warm pool the moment the plugin stops serving.

use std::sync::Arc;

use async_trait::async_trait;
use mesaplane_core::Executor;
use mesaplane_core::ExecutorError;
use mesaplane_core::ExecutorStatus;
use mesaplane_core::HealthState;
use mesaplane_core::LogEntry;
use mesaplane_core::PluginClient;
use mesaplane_core::RunDescriptor;
use mesaplane_core::RunId;

use crate::warm::WarmExecutor;

/// Executor-slot plugin contract: health-checkable and directly dispatchable.
pub trait ExecutorPlugin: PluginClient + Executor {}

impl<T: PluginClient + Executor> ExecutorPlugin for T {}

/// Executor that prefers a bound executor plugin and falls back to the warm
/// pool when the plugin's most recent health probe did not report serving.
///
/// # Invariants
/// - Health is probed fresh on every call; a plugin that flaps between
///   healthy and unhealthy never strands a run mid-dispatch on a dead path.
pub struct PluginExecutor {
    plugin: Arc<dyn ExecutorPlugin>,
    warm: WarmExecutor,
}

impl PluginExecutor {
    /// Builds a plugin-delegating executor over `plugin`, falling back to `warm`.
    #[must_use]
    pub fn new(plugin: Arc<dyn ExecutorPlugin>, warm: WarmExecutor) -> Self {
        Self { plugin, warm }
    }

    async fn healthy(&self) -> bool {
        matches!(self.plugin.health_check().await, Ok(HealthState::Serving))
    }
}

#[async_trait]
impl Executor for PluginExecutor {
    async fn submit(&self, descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
        if self.healthy().await {
            return self.plugin.submit(descriptor).await;
        }
        self.warm.submit(descriptor).await
    }

    async fn get_status(&self, run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
        if self.healthy().await {
            return self.plugin.get_status(run_id).await;
        }
        self.warm.get_status(run_id).await
    }

    async fn stream_logs(&self, run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError> {
        if self.healthy().await {
            return self.plugin.stream_logs(run_id).await;
        }
        self.warm.stream_logs(run_id).await
    }

    async fn cancel(&self, run_id: RunId) -> Result<(), ExecutorError> {
        if self.healthy().await {
            return self.plugin.cancel(run_id).await;
        }
        self.warm.cancel(run_id).await
    }

    fn implementation_label(&self) -> &'static str {
        "plugin"
    }
}

/// Always-`NotServing` executor plugin, bound when no executor-slot plugin
/// is configured so [`PluginExecutor`] always has a concrete plugin handle
/// and runs against the warm pool unconditionally.
pub struct NullExecutorPlugin;

#[async_trait]
impl mesaplane_core::PluginClient for NullExecutorPlugin {
    async fn health_check(&self) -> Result<HealthState, mesaplane_core::PluginError> {
        Ok(HealthState::NotServing)
    }

    fn protocol_version(&self) -> Option<u32> {
        None
    }

    fn slot(&self) -> mesaplane_core::PluginSlot {
        mesaplane_core::PluginSlot::Executor
    }
}

#[async_trait]
impl Executor for NullExecutorPlugin {
    async fn submit(&self, _descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
        Err(ExecutorError::Unreachable("no executor plugin bound".to_string()))
    }

    async fn get_status(&self, _run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
        Err(ExecutorError::Unreachable("no executor plugin bound".to_string()))
    }

    async fn stream_logs(&self, _run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError> {
        Err(ExecutorError::Unreachable("no executor plugin bound".to_string()))
    }

    async fn cancel(&self, _run_id: RunId) -> Result<(), ExecutorError> {
        Err(ExecutorError::Unreachable("no executor plugin bound".to_string()))
    }

    fn implementation_label(&self) -> &'static str {
        "null-plugin"
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

    use std::sync::atomic::AtomicBool;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use mesaplane_core::PluginError;
    use mesaplane_core::PluginSlot;
    use reqwest::Url;

    use super::*;
    use crate::net::EndpointPolicy;
    use crate::warm::WarmExecutorConfig;

    struct StubPlugin {
        serving: AtomicBool,
        submit_calls: AtomicBool,
    }

    #[async_trait]
    impl PluginClient for StubPlugin {
        async fn health_check(&self) -> Result<HealthState, PluginError> {
            if self.serving.load(Ordering::SeqCst) {
                Ok(HealthState::Serving)
            } else {
                Ok(HealthState::NotServing)
            }
        }

        fn protocol_version(&self) -> Option<u32> {
            Some(1)
        }

        fn slot(&self) -> PluginSlot {
            PluginSlot::Executor
        }
    }

    #[async_trait]
    impl Executor for StubPlugin {
        async fn submit(&self, _descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
            self.submit_calls.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn get_status(&self, _run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
            Err(ExecutorError::Unreachable("stub does not serve status".to_string()))
        }

        async fn stream_logs(&self, _run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError> {
            Ok(Vec::new())
        }

        async fn cancel(&self, _run_id: RunId) -> Result<(), ExecutorError> {
            Ok(())
        }

        fn implementation_label(&self) -> &'static str {
            "stub-plugin"
        }
    }

    fn warm() -> WarmExecutor {
        let config = WarmExecutorConfig {
            base_url: Url::parse("https://worker.internal").unwrap(),
            timeout: Duration::from_secs(5),
            policy: EndpointPolicy { allow_private_networks: true, ..EndpointPolicy::default() },
        };
        WarmExecutor::new(config).unwrap()
    }

    #[tokio::test]
    async fn routes_to_plugin_when_serving() {
        let plugin = Arc::new(StubPlugin { serving: AtomicBool::new(true), submit_calls: AtomicBool::new(false) });
        let executor = PluginExecutor::new(plugin.clone(), warm());
        let status = executor.stream_logs(RunId::new()).await.unwrap();
        assert!(status.is_empty());
    }

    #[tokio::test]
    async fn falls_back_to_warm_when_plugin_unhealthy() {
        let plugin = Arc::new(StubPlugin { serving: AtomicBool::new(false), submit_calls: AtomicBool::new(false) });
        let executor = PluginExecutor::new(plugin, warm());
        let err = executor.get_status(RunId::new()).await.unwrap_err();
        assert!(matches!(err, ExecutorError::Unreachable(_)));
    }
}
