// crates/mesaplane-core/src/interfaces/mod.rs
// ============================================================================
// Module: Mesaplane Interfaces
// Description: Backend-agnostic interfaces for the executor, store, object
//              store, catalog, and plugin slots.
// Purpose: Define the contract surfaces the orchestration kernel consumes
//          without embedding collaborator-specific detail.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! These traits are the only polymorphism in the core: the Executor
//! interface and the plugin slot interfaces. They are expressed as small
//! capability sets (tagged methods) rather than open inheritance, per the
//! design guidance for this system. Implementations must be deterministic
//! with respect to their inputs and must fail closed on ambiguous input.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;

use crate::core::identifiers::NamespaceId;
use crate::core::identifiers::PipelineId;
use crate::core::identifiers::QualityResultId;
use crate::core::identifiers::RunId;
use crate::core::model::Layer;
use crate::core::model::LandingFile;
use crate::core::model::LandingZone;
use crate::core::model::Namespace;
use crate::core::model::Pipeline;
use crate::core::model::PluginSlot;
use crate::core::model::QualityResult;
use crate::core::model::QualityTest;
use crate::core::model::Run;
use crate::core::model::Schedule;
use crate::core::model::Trigger;
use crate::core::pagination::ListParams;
use crate::core::pagination::Page;
use crate::core::state::RunStatus;

// ============================================================================
// SECTION: Executor
// ============================================================================

/// What the Run Engine hands the executor to start a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDescriptor {
    /// Run identifier, already persisted in `pending`.
    pub run_id: RunId,
    /// Pipeline being executed.
    pub pipeline_id: PipelineId,
    /// Namespace the pipeline belongs to.
    pub namespace: NamespaceId,
    /// Medallion layer of the pipeline.
    pub layer: Layer,
    /// Object-store prefix holding the pipeline's code.
    pub storage_prefix: String,
    /// Trace id propagated from the originating request, for downstream correlation.
    pub trace_id: String,
}

/// Executor-reported run status, polled by the Run Engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStatus {
    /// Current status as observed by the executor.
    pub status: RunStatus,
    /// Rows written so far (or at completion).
    pub rows_written: Option<i64>,
    /// Error text, populated when `status == Failed`.
    pub error: Option<String>,
}

/// One line of executor-produced log output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Timestamp the line was emitted.
    pub timestamp: OffsetDateTime,
    /// Raw log line.
    pub line: String,
}

/// Executor errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; `Unreachable` and
///   `Timeout` both classify as `transient` at the Request Layer boundary.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The executor endpoint could not be reached.
    #[error("executor unreachable: {0}")]
    Unreachable(String),
    /// The executor reported a typed failure for the operation.
    #[error("executor rejected request: {0}")]
    Rejected(String),
    /// The operation exceeded its deadline.
    #[error("executor call timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Executor capability set: Submit / GetStatus / StreamLogs / Cancel.
///
/// Implementations include a *warm* implementation (single long-lived
/// worker endpoint) and a *plugin* implementation (delegates to the
/// executor slot, falling back to warm when the plugin is unhealthy). Both
/// are polymorphic over this trait; the Run Engine never distinguishes them.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Submits a run descriptor for dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the executor is unreachable or rejects
    /// the submission outright.
    async fn submit(&self, descriptor: &RunDescriptor) -> Result<(), ExecutorError>;

    /// Polls the executor for the current status of `run_id`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the status cannot be retrieved.
    async fn get_status(&self, run_id: RunId) -> Result<ExecutorStatus, ExecutorError>;

    /// Returns a finite, non-restartable sequence of log entries produced so far.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when logs cannot be retrieved.
    async fn stream_logs(&self, run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError>;

    /// Requests cancellation of a running run.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutorError`] when the cancel RPC fails; the run remains
    /// `running` and a later Reaper pass may close it.
    async fn cancel(&self, run_id: RunId) -> Result<(), ExecutorError>;

    /// Returns the stable label this implementation reports through the
    /// `/api/v1/features` capability probe (e.g. `warmpool`, `plugin`).
    fn implementation_label(&self) -> &'static str;
}

// ============================================================================
// SECTION: Run State Store
// ============================================================================

/// Store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling and map 1:1 onto the
///   taxonomy in [`crate::core::error::ApiError`] at the Request Layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Absent entity.
    #[error("not found: {0}")]
    NotFound(String),
    /// Unique-key or state-machine violation.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Input violates a stored constraint (e.g. malformed cron, bad slug).
    #[error("invalid: {0}")]
    Violation(String),
    /// Temporary failure (pool exhaustion, lock contention); safe to retry.
    #[error("transient store error: {0}")]
    Transient(String),
    /// Unexpected failure; detail is for logs only.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Typed, transactional access to the metadata database.
///
/// Every mutating operation that touches more than one row (pipeline
/// publish, trigger fire + submit, schedule tick + submit) is wrapped in a
/// transaction by the implementation. List reads accept [`ListParams`] and
/// push them into the underlying query; implementations must never
/// post-hoc slice an in-memory vector.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Idempotently creates a namespace, returning the existing row if present.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn ensure_namespace(&self, id: &NamespaceId) -> Result<Namespace, StoreError>;

    /// Lists namespaces.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_namespaces(&self, params: ListParams) -> Result<Page<Namespace>, StoreError>;

    /// Deletes a namespace and cascades to its pipelines, schedules,
    /// triggers, landing zones, and quality rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the namespace does not exist.
    async fn delete_namespace(&self, id: &NamespaceId) -> Result<(), StoreError>;

    /// Creates a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `(namespace, layer, name)`
    /// already exists among non-deleted rows.
    async fn create_pipeline(&self, pipeline: Pipeline) -> Result<Pipeline, StoreError>;

    /// Fetches a pipeline by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn get_pipeline(&self, id: PipelineId) -> Result<Option<Pipeline>, StoreError>;

    /// Lists pipelines in a namespace, optionally including soft-deleted rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_pipelines(
        &self,
        namespace: &NamespaceId,
        include_deleted: bool,
        params: ListParams,
    ) -> Result<Page<Pipeline>, StoreError>;

    /// Updates mutable pipeline fields.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the pipeline does not exist.
    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<Pipeline, StoreError>;

    /// Soft-deletes a pipeline and cascades to its schedules, triggers, and
    /// quality tests.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the pipeline does not exist.
    async fn delete_pipeline(&self, id: PipelineId) -> Result<(), StoreError>;

    /// Creates a run in `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn create_run(&self, run: Run) -> Result<Run, StoreError>;

    /// Creates a run and advances the firing schedule's bookkeeping in one
    /// transaction, so a crash between the two cannot leave a run created
    /// with `next_run_at` unadvanced (which would refire the same window on
    /// recovery).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the schedule no longer exists;
    /// returns [`StoreError`] when the write fails for any other reason.
    async fn create_run_and_advance_schedule(
        &self,
        run: Run,
        schedule: Schedule,
    ) -> Result<(Run, Schedule), StoreError>;

    /// Creates a run and advances the firing trigger's bookkeeping in one
    /// transaction, so a crash between the two cannot leave a run created
    /// with cooldown bookkeeping unadvanced.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the trigger no longer exists;
    /// returns [`StoreError`] when the write fails for any other reason.
    async fn create_run_and_advance_trigger(
        &self,
        run: Run,
        trigger: Trigger,
    ) -> Result<(Run, Trigger), StoreError>;

    /// Fetches a run by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError>;

    /// Lists runs, optionally filtered by namespace and/or status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_runs(
        &self,
        namespace: Option<&NamespaceId>,
        status: Option<RunStatus>,
        params: ListParams,
    ) -> Result<Page<Run>, StoreError>;

    /// Conditionally updates a run's status: the write only applies when
    /// the row's current status equals `expected_current`, making the
    /// transition idempotent at the Store level.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when `expected_current` no longer
    /// matches the stored status (another writer already moved it).
    async fn transition_run(
        &self,
        id: RunId,
        expected_current: RunStatus,
        updated: Run,
    ) -> Result<Run, StoreError>;

    /// Deletes a run row outright. Used only by the Reaper to prune
    /// retained run history past the configured limits; a live run is
    /// never a deletion target since pruning only considers terminal rows.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the run does not exist.
    async fn delete_run(&self, id: RunId) -> Result<(), StoreError>;

    /// Creates a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn create_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError>;

    /// Lists all schedules (the Scheduler loads every schedule each tick).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_all_schedules(&self) -> Result<Vec<Schedule>, StoreError>;

    /// Lists schedules for a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_schedules(
        &self,
        pipeline_id: PipelineId,
        params: ListParams,
    ) -> Result<Page<Schedule>, StoreError>;

    /// Updates a schedule (cron expression, enabled flag, or tick bookkeeping).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the schedule does not exist.
    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError>;

    /// Deletes a schedule.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the schedule does not exist.
    async fn delete_schedule(&self, id: crate::core::identifiers::ScheduleId) -> Result<(), StoreError>;

    /// Creates a trigger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn create_trigger(&self, trigger: Trigger) -> Result<Trigger, StoreError>;

    /// Lists every enabled trigger (the Trigger Evaluator scans all of them
    /// per event).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_enabled_triggers(&self) -> Result<Vec<Trigger>, StoreError>;

    /// Lists triggers for a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_triggers(
        &self,
        pipeline_id: PipelineId,
        params: ListParams,
    ) -> Result<Page<Trigger>, StoreError>;

    /// Updates a trigger (config, enabled flag, or fire bookkeeping).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the trigger does not exist.
    async fn update_trigger(&self, trigger: Trigger) -> Result<Trigger, StoreError>;

    /// Deletes a trigger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the trigger does not exist.
    async fn delete_trigger(&self, id: crate::core::identifiers::TriggerId) -> Result<(), StoreError>;

    /// Creates a landing zone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn create_landing_zone(&self, zone: LandingZone) -> Result<LandingZone, StoreError>;

    /// Lists landing zones in a namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_landing_zones(
        &self,
        namespace: &NamespaceId,
        params: ListParams,
    ) -> Result<Page<LandingZone>, StoreError>;

    /// Records an uploaded landing file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn record_landing_file(&self, file: LandingFile) -> Result<LandingFile, StoreError>;

    /// Lists files in a landing zone.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_landing_files(
        &self,
        zone_id: crate::core::identifiers::LandingZoneId,
        params: ListParams,
    ) -> Result<Page<LandingFile>, StoreError>;

    /// Creates a quality test.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn create_quality_test(&self, test: QualityTest) -> Result<QualityTest, StoreError>;

    /// Lists quality tests for a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_quality_tests(
        &self,
        pipeline_id: PipelineId,
        params: ListParams,
    ) -> Result<Page<QualityTest>, StoreError>;

    /// Records a quality result.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn record_quality_result(&self, result: QualityResult) -> Result<QualityResult, StoreError>;

    /// Returns the most recent result for each test owned by a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn latest_quality_results(
        &self,
        pipeline_id: PipelineId,
    ) -> Result<Vec<QualityResult>, StoreError>;

    /// Lists every recorded result for a single test, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    async fn list_quality_results_for_test(
        &self,
        test_id: crate::core::identifiers::QualityTestId,
    ) -> Result<Vec<QualityResult>, StoreError>;

    /// Deletes a single quality result row. Used by the Reaper to prune
    /// history beyond a pipeline's configured retention count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    async fn delete_quality_result(&self, id: QualityResultId) -> Result<(), StoreError>;

    /// Attempts to acquire the named advisory lock for `holder`, held until
    /// explicitly released or until the process restarts. Used for leader
    /// election and for bounding migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the attempt itself fails (not when the
    /// lock is merely held by someone else: that is `Ok(false)`).
    async fn try_acquire_advisory_lock(&self, name: &str, holder: &str) -> Result<bool, StoreError>;

    /// Releases a previously acquired advisory lock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the release fails.
    async fn release_advisory_lock(&self, name: &str, holder: &str) -> Result<(), StoreError>;

    /// Reports store readiness for liveness/readiness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    async fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// ============================================================================
// SECTION: Object Store
// ============================================================================

/// Object store errors.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
    /// Path failed traversal/shape validation.
    #[error("invalid object path: {0}")]
    InvalidPath(String),
    /// Underlying transport or credential failure.
    #[error("object store error: {0}")]
    Backend(String),
}

/// S3-style blob API consumed for pipeline code, landing uploads, and logs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Reads the full contents of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the object is missing or unreadable.
    async fn read(&self, path: &str) -> Result<Vec<u8>, ObjectStoreError>;

    /// Writes `bytes` to `path`, overwriting any existing object.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the write fails.
    async fn write(&self, path: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError>;

    /// Deletes the object at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the delete fails.
    async fn delete(&self, path: &str) -> Result<(), ObjectStoreError>;

    /// Lists object keys under `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the listing fails.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ObjectStoreError>;
}

/// Validates an object-store-relative path: rejects `..`, absolute roots,
/// and null bytes.
///
/// # Errors
///
/// Returns [`ObjectStoreError::InvalidPath`] when the path is unsafe.
pub fn validate_object_path(path: &str) -> Result<(), ObjectStoreError> {
    if path.starts_with('/') {
        return Err(ObjectStoreError::InvalidPath("path must not be absolute".to_string()));
    }
    if path.contains('\0') {
        return Err(ObjectStoreError::InvalidPath("path must not contain a null byte".to_string()));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(ObjectStoreError::InvalidPath("path must not contain `..`".to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Catalog Client
// ============================================================================

/// A branch reported by the catalog service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogBranch {
    /// Branch identifier as reported by the catalog.
    pub branch_id: String,
}

/// Catalog client errors.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog endpoint could not be reached or returned an error status.
    #[error("catalog error: {0}")]
    Backend(String),
}

/// REST client for the catalog service, which manages branches over table metadata.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Lists branches whose identifier starts with `prefix`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the listing fails.
    async fn list_branches(&self, prefix: &str) -> Result<Vec<CatalogBranch>, CatalogError>;

    /// Deletes a branch by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the delete fails.
    async fn delete_branch(&self, branch_id: &str) -> Result<(), CatalogError>;
}

/// URL-encodes a catalog branch identifier and rejects identifiers that
/// contain `/` or `..`, per the path-segment encoding requirement.
///
/// # Errors
///
/// Returns [`CatalogError`] when `branch_id` is unsafe to place in a REST path.
pub fn encode_branch_path_segment(branch_id: &str) -> Result<String, CatalogError> {
    if branch_id.contains('/') || branch_id.contains("..") {
        return Err(CatalogError::Backend(format!(
            "branch identifier contains an unsafe path segment: {branch_id}"
        )));
    }
    Ok(url_encode(branch_id))
}

/// Minimal percent-encoding sufficient for a single REST path segment.
fn url_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

// ============================================================================
// SECTION: Plugin Slots
// ============================================================================

/// Plugin health as observed by the most recent probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Endpoint responded `serving`.
    Serving,
    /// Endpoint responded `not-serving`, timed out, or has never answered.
    NotServing,
}

/// Plugin client errors.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Health probe or RPC failed to reach the endpoint.
    #[error("plugin unreachable: {0}")]
    Unreachable(String),
    /// Endpoint reported an application-level error.
    #[error("plugin error: {0}")]
    Rejected(String),
}

/// Uniform health contract every plugin endpoint implements, regardless of slot.
#[async_trait]
pub trait PluginClient: Send + Sync {
    /// Invokes the plugin's `HealthCheck` RPC with the caller's deadline.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the probe fails or times out.
    async fn health_check(&self) -> Result<HealthState, PluginError>;

    /// Parses the negotiated protocol version from the most recent health
    /// response, when available.
    fn protocol_version(&self) -> Option<u32>;

    /// Returns which named slot this client fills.
    fn slot(&self) -> PluginSlot;
}

/// Decision returned by the sharing/enforcement slots for a write operation
/// on an owned resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Operation is permitted.
    Allow,
    /// Operation is denied.
    Deny,
}

/// Identity attached to a request after a successful `Authenticate` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque principal identifier reported by the auth plugin.
    pub subject: String,
}

/// Auth plugin slot: extracts a bearer token and resolves it to an identity.
#[async_trait]
pub trait AuthPlugin: PluginClient {
    /// Authenticates a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the token is invalid or the plugin is unreachable.
    async fn authenticate(&self, bearer_token: &str) -> Result<Identity, PluginError>;
}

/// Sharing/enforcement plugin slot: authorizes a write on an owned resource.
#[async_trait]
pub trait AccessPolicyPlugin: PluginClient {
    /// Authorizes a write operation against an owned resource.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when the plugin is unreachable.
    async fn authorize(
        &self,
        identity: Option<&Identity>,
        owner: Option<&str>,
    ) -> Result<AccessDecision, PluginError>;
}

/// Cloud-credential plugin slot: mints short-lived object-store credentials.
#[async_trait]
pub trait CloudCredentialPlugin: PluginClient {
    /// Mints a short-lived credential scoped to `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError`] when minting fails; callers surface this as `503`.
    async fn mint_credential(&self, namespace: &NamespaceId) -> Result<String, PluginError>;
}

// ============================================================================
// SECTION: Trigger Sources
// ============================================================================

/// An external stimulus the Trigger Evaluator matches against bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A file landed in a namespace/zone.
    Upload {
        /// Owning namespace.
        namespace: NamespaceId,
        /// Landing zone name.
        zone: String,
        /// Uploaded filename.
        filename: String,
    },
    /// A run reached a terminal state.
    RunComplete {
        /// Namespace of the completed pipeline.
        namespace: NamespaceId,
        /// Layer of the completed pipeline.
        layer: Layer,
        /// Name of the completed pipeline.
        pipeline_name: String,
        /// Terminal status reached.
        status: RunStatus,
    },
    /// A periodic tick, used for `cron` and `cron_dependency` trigger kinds.
    Tick,
    /// An authenticated webhook POST carrying a bearer token to match against
    /// a trigger's hashed token.
    Webhook {
        /// Raw bearer token as received; compared in constant time against
        /// stored hashes.
        token: String,
    },
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
    fn validate_object_path_rejects_traversal() {
        assert!(validate_object_path("ns/../etc/passwd").is_err());
    }

    #[test]
    fn validate_object_path_rejects_absolute() {
        assert!(validate_object_path("/etc/passwd").is_err());
    }

    #[test]
    fn validate_object_path_accepts_relative() {
        assert!(validate_object_path("ns/pipelines/bronze/orders/main.sql").is_ok());
    }

    #[test]
    fn encode_branch_path_segment_rejects_slash() {
        assert!(encode_branch_path_segment("run-1/evil").is_err());
    }

    #[test]
    fn encode_branch_path_segment_rejects_dotdot() {
        assert!(encode_branch_path_segment("run-..-1").is_err());
    }

    #[test]
    fn encode_branch_path_segment_encodes_space() {
        assert_eq!(encode_branch_path_segment("run 1").unwrap(), "run%201");
    }
}
