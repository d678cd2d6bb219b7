// crates/mesaplane-core/src/lib.rs
// ============================================================================
// Module: Mesaplane Core
// Description: Entity model, identifiers, state machine, and collaborator interfaces.
// Purpose: Provide the shared vocabulary every other crate in the workspace builds on.
// Dependencies: serde, time, uuid, async-trait, thiserror
// ============================================================================

//! ## Overview
//! `mesaplane-core` has no knowledge of SQLite, HTTP, or any RPC transport.
//! It defines the entities (§3), the run state machine (§4.2), the error
//! taxonomy (§7), and the trait boundaries (`Executor`, `MetadataStore`,
//! `ObjectStore`, `CatalogClient`, plugin slots) that every other crate
//! either implements or consumes.
//!
//! Invariants:
//! - This crate performs no I/O.
//! - Every trait here is implemented by exactly one other crate in the
//!   production build, and by a fake in tests.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::error::ApiError;
pub use core::identifiers::LandingFileId;
pub use core::identifiers::LandingZoneId;
pub use core::identifiers::NamespaceId;
pub use core::identifiers::PipelineId;
pub use core::identifiers::QualityResultId;
pub use core::identifiers::QualityTestId;
pub use core::identifiers::RunId;
pub use core::identifiers::ScheduleId;
pub use core::identifiers::SlugError;
pub use core::identifiers::TriggerId;
pub use core::model::Layer;
pub use core::model::LandingFile;
pub use core::model::LandingZone;
pub use core::model::Namespace;
pub use core::model::Pipeline;
pub use core::model::PipelineKind;
pub use core::model::PluginBinding;
pub use core::model::PluginHealth;
pub use core::model::PluginSlot;
pub use core::model::QualityResult;
pub use core::model::QualityTest;
pub use core::model::RetentionOverrides;
pub use core::model::Run;
pub use core::model::Schedule;
pub use core::model::Trigger;
pub use core::model::TriggerConfig;
pub use core::pagination::ListParams;
pub use core::pagination::Page;
pub use core::state::InvalidTransition;
pub use core::state::RunStatus;
pub use core::state::RunTransition;
pub use interfaces::AccessDecision;
pub use interfaces::AccessPolicyPlugin;
pub use interfaces::AuthPlugin;
pub use interfaces::CatalogBranch;
pub use interfaces::CatalogClient;
pub use interfaces::CatalogError;
pub use interfaces::CloudCredentialPlugin;
pub use interfaces::Executor;
pub use interfaces::ExecutorError;
pub use interfaces::ExecutorStatus;
pub use interfaces::HealthState;
pub use interfaces::Identity;
pub use interfaces::LogEntry;
pub use interfaces::MetadataStore;
pub use interfaces::ObjectStore;
pub use interfaces::ObjectStoreError;
pub use interfaces::PluginClient;
pub use interfaces::PluginError;
pub use interfaces::RunDescriptor;
pub use interfaces::StoreError;
pub use interfaces::TriggerEvent;
pub use interfaces::encode_branch_path_segment;
pub use interfaces::validate_object_path;
