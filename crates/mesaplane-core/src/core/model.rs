// crates/mesaplane-core/src/core/model.rs
// ============================================================================
// Module: Mesaplane Data Model
// Description: Core control-plane entities (Namespace, Pipeline, Run, Schedule, Trigger, ...).
// Purpose: Provide the persisted shapes that every Store implementation must round-trip.
// Dependencies: crate::core::identifiers, crate::core::state, serde, time
// ============================================================================

//! ## Overview
//! These types carry no persistence or transport behavior of their own; the
//! Store abstraction (`mesaplane-store-sqlite`) is responsible for mapping
//! them onto rows, and the Request Layer (`mesaplane-server`) is responsible
//! for mapping them onto the REST JSON envelope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::core::identifiers::LandingFileId;
use crate::core::identifiers::LandingZoneId;
use crate::core::identifiers::NamespaceId;
use crate::core::identifiers::PipelineId;
use crate::core::identifiers::QualityResultId;
use crate::core::identifiers::QualityTestId;
use crate::core::identifiers::RunId;
use crate::core::identifiers::ScheduleId;
use crate::core::identifiers::TriggerId;
use crate::core::state::RunStatus;

// ============================================================================
// SECTION: Namespace
// ============================================================================

/// A namespace: the top-level tenancy unit for pipelines and landing zones.
///
/// # Invariants
/// - `id` is unique across the deployment.
/// - Deleting a namespace cascades to every child row referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace identifier (slug).
    pub id: NamespaceId,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Medallion layer a pipeline belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Raw, unprocessed ingestion tier.
    Bronze,
    /// Cleaned, validated tier.
    Silver,
    /// Aggregated, presentation-ready tier.
    Gold,
}

impl Layer {
    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
        }
    }
}

/// The execution model of a pipeline's transformation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// Code is a templated SQL statement.
    Sql,
    /// Code is an embedded script (language is a worker concern).
    Script,
}

/// A data transformation pipeline.
///
/// # Invariants
/// - `(namespace, layer, name)` is unique among rows with `deleted_at == None`.
/// - Soft-deleted pipelines keep their row for audit; deleting cascades to
///   owned schedules, triggers, and quality tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline identifier.
    pub id: PipelineId,
    /// Owning namespace.
    pub namespace: NamespaceId,
    /// Medallion layer.
    pub layer: Layer,
    /// Pipeline name (slug, unique within `(namespace, layer)`).
    pub name: String,
    /// Transformation code kind.
    pub kind: PipelineKind,
    /// Object-store prefix holding the pipeline's code files.
    pub storage_prefix: String,
    /// Free-form human description.
    pub description: Option<String>,
    /// Owning principal, when known; consulted by the sharing/enforcement slots.
    pub owner: Option<String>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last-update timestamp.
    pub updated_at: OffsetDateTime,
    /// Soft-delete timestamp; `None` for live pipelines.
    pub deleted_at: Option<OffsetDateTime>,
    /// Per-pipeline retention overrides; unset fields fall back to the
    /// Reaper's system-wide defaults.
    pub retention_overrides: RetentionOverrides,
}

/// Nullable per-pipeline retention overrides, merged over
/// `mesaplane_config::RetentionConfig` at Reaper sweep time. A `None` field
/// defers to the system default; a `Some` field replaces it for this
/// pipeline only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionOverrides {
    /// Overrides `RetentionConfig::max_runs_per_pipeline`.
    pub max_runs_per_pipeline: Option<u32>,
    /// Overrides `RetentionConfig::max_age_days`.
    pub max_age_days: Option<u32>,
    /// Overrides `RetentionConfig::log_retention_days`.
    pub log_retention_days: Option<u32>,
    /// Caps the number of `QualityResult` rows retained per `QualityTest`
    /// owned by this pipeline; oldest rows beyond the cap are pruned.
    /// `None` means quality history is not pruned for this pipeline.
    pub quality_history_per_test: Option<u32>,
}

impl Pipeline {
    /// Returns whether this pipeline is soft-deleted.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

// ============================================================================
// SECTION: Run
// ============================================================================

/// One invocation of a pipeline.
///
/// # Invariants
/// - `status` only ever moves forward through [`crate::core::state::RunTransition`].
/// - `finished_at.is_some() == status.is_terminal()`.
/// - `duration_ms == finished_at - started_at` in milliseconds, when both are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Run identifier.
    pub id: RunId,
    /// Pipeline this run belongs to.
    pub pipeline_id: PipelineId,
    /// Current lifecycle status.
    pub status: RunStatus,
    /// Free-form tag describing what caused the run (e.g. `manual`,
    /// `schedule:<cron>`, `trigger:<kind>:<id>`).
    pub trigger: String,
    /// Dispatch timestamp, set when the run leaves `pending`.
    pub started_at: Option<OffsetDateTime>,
    /// Completion timestamp, set exactly when status becomes terminal.
    pub finished_at: Option<OffsetDateTime>,
    /// Wall-clock duration in milliseconds, set alongside `finished_at`.
    pub duration_ms: Option<i64>,
    /// Rows written, reported by the executor on success.
    pub rows_written: Option<i64>,
    /// Error message, set when status is `failed`.
    pub error: Option<String>,
    /// Object-store URI for the run's log artifact, when available.
    pub logs_uri: Option<String>,
    /// Row creation timestamp.
    pub created_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Schedule
// ============================================================================

/// A cron-based binding that fires runs periodically.
///
/// # Invariants
/// - `next_run_at` is monotone non-decreasing across successful ticks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    /// Schedule identifier.
    pub id: ScheduleId,
    /// Pipeline this schedule fires.
    pub pipeline_id: PipelineId,
    /// 5-field cron expression.
    pub cron_expr: String,
    /// Whether the schedule is active.
    pub enabled: bool,
    /// Run id produced by the most recent fire, if any.
    pub last_run_id: Option<RunId>,
    /// Timestamp of the most recent fire, if any.
    pub last_run_at: Option<OffsetDateTime>,
    /// Next scheduled fire time; `None` until the first tick registers it.
    pub next_run_at: Option<OffsetDateTime>,
}

// ============================================================================
// SECTION: Trigger
// ============================================================================

/// Per-kind trigger configuration.
///
/// # Invariants
/// - The active variant always matches the owning [`Trigger::kind_name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerConfig {
    /// Fires when a file lands in `(namespace, zone)`.
    Upload {
        /// Namespace owning the landing zone.
        namespace: NamespaceId,
        /// Landing zone name.
        zone: String,
    },
    /// Fires when a file lands in `(namespace, zone)` matching `glob`.
    FilePattern {
        /// Namespace owning the landing zone.
        namespace: NamespaceId,
        /// Landing zone name.
        zone: String,
        /// Glob pattern matched against the uploaded filename.
        glob: String,
    },
    /// Fires when `(namespace, layer, pipeline)` completes with `success`.
    PipelineSuccess {
        /// Namespace of the upstream pipeline.
        namespace: NamespaceId,
        /// Medallion layer of the upstream pipeline.
        layer: Layer,
        /// Name of the upstream pipeline.
        pipeline: String,
    },
    /// Fires on a standalone cron schedule, reusing the Scheduler's tick math.
    Cron {
        /// 5-field cron expression.
        expr: String,
    },
    /// Fires on a cron tick, gated on upstream dependencies producing new data.
    CronDependency {
        /// 5-field cron expression.
        expr: String,
        /// Upstream pipeline identifiers gating the fire.
        dependencies: Vec<PipelineId>,
    },
    /// Fires on an authenticated webhook POST carrying the trigger's token.
    Webhook {
        /// SHA-256 hash of the webhook token; never the raw token.
        token_hash: String,
    },
}

impl TriggerConfig {
    /// Returns the stable wire label for the active variant.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Upload { .. } => "upload",
            Self::FilePattern { .. } => "file_pattern",
            Self::PipelineSuccess { .. } => "pipeline_success",
            Self::Cron { .. } => "cron",
            Self::CronDependency { .. } => "cron_dependency",
            Self::Webhook { .. } => "webhook",
        }
    }
}

/// An event-based binding that fires runs on external stimuli.
///
/// # Invariants
/// - Fires again only when `now - last_triggered_at >= cooldown_seconds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger identifier.
    pub id: TriggerId,
    /// Pipeline this trigger fires.
    pub pipeline_id: PipelineId,
    /// Per-kind configuration.
    pub config: TriggerConfig,
    /// Whether the trigger is active.
    pub enabled: bool,
    /// Minimum seconds between fires.
    pub cooldown_seconds: u64,
    /// Timestamp of the most recent fire, if any.
    pub last_triggered_at: Option<OffsetDateTime>,
    /// Run id produced by the most recent fire, if any.
    pub last_run_id: Option<RunId>,
}

// ============================================================================
// SECTION: Landing Zone / File
// ============================================================================

/// A per-namespace inbox for raw file uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingZone {
    /// Landing zone identifier.
    pub id: LandingZoneId,
    /// Owning namespace.
    pub namespace: NamespaceId,
    /// Zone name (slug, unique within the namespace).
    pub name: String,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

/// A file uploaded into a [`LandingZone`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LandingFile {
    /// Landing file identifier.
    pub id: LandingFileId,
    /// Owning landing zone.
    pub zone_id: LandingZoneId,
    /// Uploaded filename, validated against path-traversal at the Request Layer.
    pub filename: String,
    /// Object-store URI for the uploaded bytes.
    pub object_uri: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Upload timestamp.
    pub uploaded_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Quality
// ============================================================================

/// An authored data-quality test linked to a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityTest {
    /// Quality test identifier.
    pub id: QualityTestId,
    /// Owning pipeline.
    pub pipeline_id: PipelineId,
    /// Test name.
    pub name: String,
    /// Test expression, interpreted by the worker.
    pub expression: String,
}

/// The outcome of a [`QualityTest`] against a specific [`Run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityResult {
    /// Quality result identifier.
    pub id: QualityResultId,
    /// Quality test this result belongs to.
    pub test_id: QualityTestId,
    /// Run this result was produced by.
    pub run_id: RunId,
    /// Whether the test passed.
    pub passed: bool,
    /// Detail message, populated on failure.
    pub detail: Option<String>,
    /// Timestamp the result was recorded.
    pub recorded_at: OffsetDateTime,
}

// ============================================================================
// SECTION: Plugin Binding (in-process, not persisted)
// ============================================================================

/// A named extension point filled by an out-of-process plugin endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginSlot {
    /// Request-authentication plugin.
    Auth,
    /// Executor plugin (Submit/Status/Logs/Cancel).
    Executor,
    /// Resource-sharing policy plugin.
    Sharing,
    /// Write-path enforcement policy plugin.
    Enforcement,
    /// Short-lived object-store credential vending plugin.
    CloudCredential,
}

impl PluginSlot {
    /// All slot names the Registry recognizes.
    pub const ALL: [Self; 5] =
        [Self::Auth, Self::Executor, Self::Sharing, Self::Enforcement, Self::CloudCredential];

    /// Parses a slot name, returning `None` for unknown names (logged and
    /// skipped by the caller per the load protocol).
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "auth" => Some(Self::Auth),
            "executor" => Some(Self::Executor),
            "sharing" => Some(Self::Sharing),
            "enforcement" => Some(Self::Enforcement),
            "cloud_credential" => Some(Self::CloudCredential),
            _ => None,
        }
    }

    /// Returns the stable wire label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auth => "auth",
            Self::Executor => "executor",
            Self::Sharing => "sharing",
            Self::Enforcement => "enforcement",
            Self::CloudCredential => "cloud_credential",
        }
    }
}

/// Health status of a connected plugin endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginHealth {
    /// Most recent health probe reported serving.
    Serving,
    /// Most recent health probe reported not-serving, or none has succeeded.
    Disabled,
}

/// An in-process record of a loaded plugin endpoint; rebuilt at bootstrap,
/// never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginBinding {
    /// Slot this binding fills.
    pub slot: PluginSlot,
    /// RPC endpoint address.
    pub address: String,
    /// Most recently observed health.
    pub status: PluginHealth,
    /// Timestamp of the most recent health probe.
    pub last_probed_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_slot_parse_round_trips_known_names() {
        for slot in PluginSlot::ALL {
            assert_eq!(PluginSlot::parse(slot.as_str()), Some(slot));
        }
    }

    #[test]
    fn plugin_slot_parse_rejects_unknown_name() {
        assert_eq!(PluginSlot::parse("not-a-slot"), None);
    }

    #[test]
    fn trigger_config_kind_name_matches_variant() {
        let cfg = TriggerConfig::Webhook { token_hash: "abc".to_string() };
        assert_eq!(cfg.kind_name(), "webhook");
    }
}
