// crates/mesaplane-executors/src/warm.rs
// ============================================================================
// Module: Warm Pool Executor
// Description: Executor backed by a single long-lived worker HTTP endpoint.
// Purpose: Default dispatch path when no executor plugin is bound.
// Dependencies: mesaplane-core, reqwest
// ============================================================================

//! ## Overview
//! The warm pool is one operator-configured worker endpoint exposing
//! `POST /submit`, `GET /status/{run_id}`, `GET /logs/{run_id}`, and
//! `POST /cancel/{run_id}`. Every call revalidates the endpoint URL and its
//! resolved addresses against [`EndpointPolicy`] so a stale or compromised
//! DNS record cannot redirect dispatch traffic onto private infrastructure.

use std::time::Duration;

use async_trait::async_trait;
use mesaplane_core::Executor;
use mesaplane_core::ExecutorError;
use mesaplane_core::ExecutorStatus;
use mesaplane_core::LogEntry;
use mesaplane_core::RunDescriptor;
use mesaplane_core::RunId;
use reqwest::Client;
use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;

use crate::net::EndpointPolicy;
use crate::net::enforce_resolved_host_policy;
use crate::net::validate_endpoint_url;

/// Configuration for [`WarmExecutor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmExecutorConfig {
    /// Base URL of the worker endpoint, e.g. `https://worker.internal:9443`.
    pub base_url: Url,
    /// Per-call timeout.
    pub timeout: Duration,
    /// Outbound endpoint policy.
    pub policy: EndpointPolicy,
}

/// Executor implementation that dispatches to a single warm worker endpoint.
///
/// # Invariants
/// - Never follows redirects; a worker that issues one fails the call.
pub struct WarmExecutor {
    config: WarmExecutorConfig,
    client: Client,
}

impl WarmExecutor {
    /// Builds a warm executor for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError::Rejected`] when the client cannot be built or
    /// the base URL fails policy validation.
    pub fn new(config: WarmExecutorConfig) -> Result<Self, ExecutorError> {
        validate_endpoint_url(&config.base_url, &config.policy)?;
        let client = Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ExecutorError::Rejected(format!("building http client: {err}")))?;
        Ok(Self { config, client })
    }

    /// Joins `path` onto the configured base URL after re-checking resolved
    /// host policy.
    async fn endpoint(&self, path: &str) -> Result<Url, ExecutorError> {
        enforce_resolved_host_policy(&self.config.base_url, &self.config.policy).await?;
        self.config
            .base_url
            .join(path)
            .map_err(|err| ExecutorError::Rejected(format!("building endpoint path {path}: {err}")))
    }
}

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    run_id: &'a str,
    pipeline_id: &'a str,
    namespace: &'a str,
    layer: &'a str,
    storage_prefix: &'a str,
    trace_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
    rows_written: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogLineResponse {
    timestamp: time::OffsetDateTime,
    line: String,
}

fn parse_status(raw: &str) -> Result<mesaplane_core::RunStatus, ExecutorError> {
    use mesaplane_core::RunStatus;
    match raw {
        "pending" => Ok(RunStatus::Pending),
        "running" => Ok(RunStatus::Running),
        "success" => Ok(RunStatus::Success),
        "failed" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        other => Err(ExecutorError::Rejected(format!("worker reported unknown status: {other}"))),
    }
}

#[async_trait]
impl Executor for WarmExecutor {
    async fn submit(&self, descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
        let url = self.endpoint("submit").await?;
        let body = SubmitRequest {
            run_id: &descriptor.run_id.to_string(),
            pipeline_id: &descriptor.pipeline_id.to_string(),
            namespace: descriptor.namespace.as_str(),
            layer: descriptor.layer.as_str(),
            storage_prefix: &descriptor.storage_prefix,
            trace_id: &descriptor.trace_id,
        };
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|err| ExecutorError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Rejected(format!("worker rejected submit: {}", response.status())));
        }
        Ok(())
    }

    async fn get_status(&self, run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
        let url = self.endpoint(&format!("status/{run_id}")).await?;
        let response =
            self.client.get(url).send().await.map_err(|err| ExecutorError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Rejected(format!("worker rejected status poll: {}", response.status())));
        }
        let parsed: StatusResponse =
            response.json().await.map_err(|err| ExecutorError::Rejected(format!("malformed status body: {err}")))?;
        Ok(ExecutorStatus {
            status: parse_status(&parsed.status)?,
            rows_written: parsed.rows_written,
            error: parsed.error,
        })
    }

    async fn stream_logs(&self, run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError> {
        let url = self.endpoint(&format!("logs/{run_id}")).await?;
        let response =
            self.client.get(url).send().await.map_err(|err| ExecutorError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Rejected(format!("worker rejected log fetch: {}", response.status())));
        }
        let lines: Vec<LogLineResponse> =
            response.json().await.map_err(|err| ExecutorError::Rejected(format!("malformed log body: {err}")))?;
        Ok(lines.into_iter().map(|line| LogEntry { timestamp: line.timestamp, line: line.line }).collect())
    }

    async fn cancel(&self, run_id: RunId) -> Result<(), ExecutorError> {
        let url = self.endpoint(&format!("cancel/{run_id}")).await?;
        let response =
            self.client.post(url).send().await.map_err(|err| ExecutorError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Rejected(format!("worker rejected cancel: {}", response.status())));
        }
        Ok(())
    }

    fn implementation_label(&self) -> &'static str {
        "warmpool"
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
    fn rejects_base_url_with_disallowed_scheme() {
        let config = WarmExecutorConfig {
            base_url: Url::parse("http://worker.internal").unwrap(),
            timeout: Duration::from_secs(5),
            policy: EndpointPolicy::default(),
        };
        assert!(WarmExecutor::new(config).is_err());
    }

    #[test]
    fn parse_status_rejects_unknown_label() {
        assert!(parse_status("zombie").is_err());
    }
}
