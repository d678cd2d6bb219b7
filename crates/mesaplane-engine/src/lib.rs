// crates/mesaplane-engine/src/lib.rs
// ============================================================================
// Module: Mesaplane Engine
// Description: The four background components that drive the orchestration
//              kernel forward without a request in flight: the Run Engine,
//              the Scheduler, the Trigger Evaluator, and the Reaper.
// Purpose: Own every state transition a run goes through once the Request
//          Layer has handed it off, and the cron/event machinery that
//          decides when a new run should be created at all.
// Dependencies: mesaplane-core, tokio, cron, subtle
// ============================================================================

//! ## Overview
//! Each component here owns exactly one long-lived background task with a
//! private stop signal, per the concurrency model: a `tokio::select!` over a
//! ticker and a `tokio::sync::oneshot::Receiver`. None of them hold a `dyn`
//! executor at their hot path; [`engine::RunEngine`] is generic over
//! `E: Executor`, so the only dynamic dispatch in the whole run lifecycle
//! lives inside `mesaplane-executors::PluginExecutor`, at the plugin/warm
//! boundary.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod engine;
pub mod reaper;
pub mod scheduler;
pub mod triggers;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use engine::EngineError;
pub use engine::RunEngine;
pub use reaper::Reaper;
pub use reaper::ReaperConfig;
pub use scheduler::Scheduler;
pub use scheduler::SchedulerError;
pub use triggers::TriggerEvaluator;
pub use triggers::TriggerMatchError;
