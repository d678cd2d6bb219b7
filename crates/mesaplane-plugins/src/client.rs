// crates/mesaplane-plugins/src/client.rs
// ============================================================================
// Module: HTTP Plugin Client
// Description: Concrete PluginClient implementation over an HTTP RPC endpoint.
// Purpose: Give every plugin slot a uniform transport for HealthCheck plus
//          the slot-specific RPC each plugin trait adds.
// Dependencies: mesaplane-core, reqwest
// ============================================================================

//! ## Overview
//! Every plugin endpoint speaks the same binary-over-HTTP RPC shape: a JSON
//! body, a `POST`, and a uniform `/health` probe. [`HttpPluginClient`] is
//! that transport; slot-specific behavior (authenticate, authorize,
//! mint_credential) is a thin JSON call layered on top of it.

use std::time::Duration;

use async_trait::async_trait;
use mesaplane_core::AccessDecision;
use mesaplane_core::AccessPolicyPlugin;
use mesaplane_core::AuthPlugin;
use mesaplane_core::CloudCredentialPlugin;
use mesaplane_core::Executor;
use mesaplane_core::ExecutorError;
use mesaplane_core::ExecutorStatus;
use mesaplane_core::HealthState;
use mesaplane_core::Identity;
use mesaplane_core::LogEntry;
use mesaplane_core::NamespaceId;
use mesaplane_core::PluginClient;
use mesaplane_core::PluginError;
use mesaplane_core::PluginSlot;
use mesaplane_core::RunDescriptor;
use mesaplane_core::RunId;
use reqwest::Client;
use reqwest::Url;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::Mutex;

/// Deadline applied to every `HealthCheck` RPC.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
    protocol: Option<u32>,
}

/// HTTP-backed client for a single plugin endpoint.
///
/// # Invariants
/// - `protocol_version` reflects only the most recently observed
///   `HealthCheck` response; it is `None` until the first successful probe.
pub struct HttpPluginClient {
    slot: PluginSlot,
    base_url: Url,
    client: Client,
    protocol_version: Mutex<Option<u32>>,
}

impl HttpPluginClient {
    /// Builds a client for `slot` at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Unreachable`] when the HTTP client cannot be built.
    pub fn new(slot: PluginSlot, base_url: Url) -> Result<Self, PluginError> {
        let client = Client::builder()
            .timeout(HEALTH_CHECK_TIMEOUT)
            .build()
            .map_err(|err| PluginError::Unreachable(err.to_string()))?;
        Ok(Self { slot, base_url, client, protocol_version: Mutex::new(None) })
    }

    fn endpoint(&self, path: &str) -> Result<Url, PluginError> {
        self.base_url.join(path).map_err(|err| PluginError::Unreachable(format!("building endpoint {path}: {err}")))
    }

    async fn post_json<B: Serialize + Sync, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R, PluginError> {
        let url = self.endpoint(path)?;
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|err| PluginError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PluginError::Rejected(format!("plugin returned {}", response.status())));
        }
        response.json().await.map_err(|err| PluginError::Rejected(format!("malformed plugin response: {err}")))
    }
}

#[async_trait]
impl PluginClient for HttpPluginClient {
    async fn health_check(&self) -> Result<HealthState, PluginError> {
        let url = self.endpoint("health")?;
        let response = self
            .client
            .get(url)
            .timeout(HEALTH_CHECK_TIMEOUT)
            .send()
            .await
            .map_err(|err| PluginError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(PluginError::Unreachable(format!("health probe returned {}", response.status())));
        }
        let parsed: HealthResponse =
            response.json().await.map_err(|err| PluginError::Rejected(format!("malformed health body: {err}")))?;
        *self.protocol_version.lock().await = parsed.protocol;
        if parsed.status == "serving" { Ok(HealthState::Serving) } else { Ok(HealthState::NotServing) }
    }

    fn protocol_version(&self) -> Option<u32> {
        self.protocol_version.try_lock().ok().and_then(|guard| *guard)
    }

    fn slot(&self) -> PluginSlot {
        self.slot
    }
}

#[derive(Debug, Serialize)]
struct AuthenticateRequest<'a> {
    bearer_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct AuthenticateResponse {
    subject: String,
}

#[async_trait]
impl AuthPlugin for HttpPluginClient {
    async fn authenticate(&self, bearer_token: &str) -> Result<Identity, PluginError> {
        let response: AuthenticateResponse =
            self.post_json("authenticate", &AuthenticateRequest { bearer_token }).await?;
        Ok(Identity { subject: response.subject })
    }
}

#[derive(Debug, Serialize)]
struct AuthorizeRequest<'a> {
    identity: Option<&'a str>,
    owner: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct AuthorizeResponse {
    allow: bool,
}

#[async_trait]
impl AccessPolicyPlugin for HttpPluginClient {
    async fn authorize(
        &self,
        identity: Option<&Identity>,
        owner: Option<&str>,
    ) -> Result<AccessDecision, PluginError> {
        let request = AuthorizeRequest { identity: identity.map(|id| id.subject.as_str()), owner };
        let response: AuthorizeResponse = self.post_json("authorize", &request).await?;
        Ok(if response.allow { AccessDecision::Allow } else { AccessDecision::Deny })
    }
}

#[derive(Debug, Serialize)]
struct MintCredentialRequest<'a> {
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
struct MintCredentialResponse {
    credential: String,
}

#[async_trait]
impl CloudCredentialPlugin for HttpPluginClient {
    async fn mint_credential(&self, namespace: &NamespaceId) -> Result<String, PluginError> {
        let response: MintCredentialResponse =
            self.post_json("mint-credential", &MintCredentialRequest { namespace: namespace.as_str() }).await?;
        Ok(response.credential)
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
struct ExecutorStatusResponse {
    status: String,
    rows_written: Option<i64>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LogLineResponse {
    timestamp: time::OffsetDateTime,
    line: String,
}

fn parse_run_status(raw: &str) -> Result<mesaplane_core::RunStatus, ExecutorError> {
    use mesaplane_core::RunStatus;
    match raw {
        "pending" => Ok(RunStatus::Pending),
        "running" => Ok(RunStatus::Running),
        "success" => Ok(RunStatus::Success),
        "failed" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        other => Err(ExecutorError::Rejected(format!("executor plugin reported unknown status: {other}"))),
    }
}

/// An executor-slot plugin speaks the same RPC shape as the warm pool
/// worker: `POST /submit`, `GET /status/{run_id}`, `GET /logs/{run_id}`,
/// `POST /cancel/{run_id}`.
#[async_trait]
impl Executor for HttpPluginClient {
    async fn submit(&self, descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
        let url = self.endpoint("submit").map_err(|err| ExecutorError::Rejected(err.to_string()))?;
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
            return Err(ExecutorError::Rejected(format!("executor plugin rejected submit: {}", response.status())));
        }
        Ok(())
    }

    async fn get_status(&self, run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
        let url = self.endpoint(&format!("status/{run_id}")).map_err(|err| ExecutorError::Rejected(err.to_string()))?;
        let response = self.client.get(url).send().await.map_err(|err| ExecutorError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Rejected(format!("executor plugin rejected status poll: {}", response.status())));
        }
        let parsed: ExecutorStatusResponse =
            response.json().await.map_err(|err| ExecutorError::Rejected(format!("malformed status body: {err}")))?;
        Ok(ExecutorStatus {
            status: parse_run_status(&parsed.status)?,
            rows_written: parsed.rows_written,
            error: parsed.error,
        })
    }

    async fn stream_logs(&self, run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError> {
        let url = self.endpoint(&format!("logs/{run_id}")).map_err(|err| ExecutorError::Rejected(err.to_string()))?;
        let response = self.client.get(url).send().await.map_err(|err| ExecutorError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Rejected(format!("executor plugin rejected log fetch: {}", response.status())));
        }
        let lines: Vec<LogLineResponse> =
            response.json().await.map_err(|err| ExecutorError::Rejected(format!("malformed log body: {err}")))?;
        Ok(lines.into_iter().map(|line| LogEntry { timestamp: line.timestamp, line: line.line }).collect())
    }

    async fn cancel(&self, run_id: RunId) -> Result<(), ExecutorError> {
        let url = self.endpoint(&format!("cancel/{run_id}")).map_err(|err| ExecutorError::Rejected(err.to_string()))?;
        let response = self.client.post(url).send().await.map_err(|err| ExecutorError::Unreachable(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ExecutorError::Rejected(format!("executor plugin rejected cancel: {}", response.status())));
        }
        Ok(())
    }

    fn implementation_label(&self) -> &'static str {
        "plugin"
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
    fn protocol_version_starts_unset() {
        let client = HttpPluginClient::new(PluginSlot::Auth, Url::parse("https://plugin.internal").unwrap())
            .expect("client builds");
        assert_eq!(client.protocol_version(), None);
    }
}
