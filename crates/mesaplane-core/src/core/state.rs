// crates/mesaplane-core/src/core/state.rs
// ============================================================================
// Module: Mesaplane Run State Machine
// Description: Run status transitions and the rules that guard them.
// Purpose: Make illegal run transitions unrepresentable outside the Store write path.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! A [`Run`](crate::core::model::Run) moves through a small state machine:
//! `pending -> running -> {success, failed}`, with `cancelled` reachable
//! from `pending` or `running` only. Terminal states are sticky: once a run
//! reaches `success`, `failed`, or `cancelled`, no further transition is
//! permitted.
//!
//! This module owns only the transition rules, not persistence. The Store
//! enforces them with a where-clause on the current status so that two
//! concurrent writers (the poll loop and a cancel request) cannot both
//! succeed in moving a run past its terminal state.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Run Status
// ============================================================================

/// Lifecycle status of a [`Run`](crate::core::model::Run).
///
/// # Invariants
/// - `finished_at` on the owning [`Run`] is set if and only if status is
///   terminal ([`RunStatus::is_terminal`]).
/// - Once terminal, a run never transitions again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run row created; not yet dispatched or dispatch not yet acknowledged.
    Pending,
    /// Executor acknowledged dispatch; poll loop is tracking status.
    Running,
    /// Terminal: executor reported successful completion.
    Success,
    /// Terminal: dispatch failed, the executor reported failure, or the
    /// Reaper force-closed a stuck run.
    Failed,
    /// Terminal: cancelled from `pending` or `running`.
    Cancelled,
}

impl RunStatus {
    /// Returns whether this status is terminal (sticky; no further writes).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Cancelled)
    }

    /// Returns the stable wire label used in trigger tags and API responses.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A single legal transition between two [`RunStatus`] values.
///
/// # Invariants
/// - `from -> to` only exists in [`RunTransition::is_allowed`] when the edge
///   appears in the state diagram in the component design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTransition {
    /// Status before the transition.
    pub from: RunStatus,
    /// Status after the transition.
    pub to: RunStatus,
}

impl RunTransition {
    /// Returns whether `from -> to` is a legal edge in the run state machine.
    ///
    /// ```text
    ///                 cancel
    ///   pending --------------------+
    ///      |                        v
    ///      +---> running ----> success
    ///      |        |
    ///      |        +--------> failed
    ///      |        |
    ///      +------> cancelled <-----+ (from running)
    ///      +------> failed
    /// ```
    #[must_use]
    pub const fn is_allowed(from: RunStatus, to: RunStatus) -> bool {
        use RunStatus::{Cancelled, Failed, Pending, Running, Success};
        matches!(
            (from, to),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Success)
                | (Running, Failed)
                | (Running, Cancelled)
        )
    }

    /// Validates and constructs a transition.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] when `from` is already terminal or the
    /// edge is not present in the state diagram.
    pub fn new(from: RunStatus, to: RunStatus) -> Result<Self, InvalidTransition> {
        if from.is_terminal() {
            return Err(InvalidTransition::AlreadyTerminal { from });
        }
        if !Self::is_allowed(from, to) {
            return Err(InvalidTransition::NoSuchEdge { from, to });
        }
        Ok(Self { from, to })
    }
}

/// Error raised when an attempted run transition is illegal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTransition {
    /// The run has already reached a terminal state; no further writes are permitted.
    #[error("run is already terminal in status {from:?}")]
    AlreadyTerminal {
        /// Current (terminal) status.
        from: RunStatus,
    },
    /// No edge in the state diagram connects `from` to `to`.
    #[error("no transition from {from:?} to {to:?}")]
    NoSuchEdge {
        /// Current status.
        from: RunStatus,
        /// Attempted next status.
        to: RunStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use RunStatus::{Cancelled, Failed, Pending, Running, Success};

    #[test]
    fn pending_can_reach_running_failed_or_cancelled() {
        assert!(RunTransition::new(Pending, Running).is_ok());
        assert!(RunTransition::new(Pending, Failed).is_ok());
        assert!(RunTransition::new(Pending, Cancelled).is_ok());
    }

    #[test]
    fn pending_cannot_reach_success_directly() {
        assert!(RunTransition::new(Pending, Success).is_err());
    }

    #[test]
    fn running_can_reach_any_terminal_state() {
        assert!(RunTransition::new(Running, Success).is_ok());
        assert!(RunTransition::new(Running, Failed).is_ok());
        assert!(RunTransition::new(Running, Cancelled).is_ok());
    }

    #[test]
    fn terminal_states_reject_all_further_transitions() {
        for terminal in [Success, Failed, Cancelled] {
            for candidate in [Pending, Running, Success, Failed, Cancelled] {
                assert_eq!(
                    RunTransition::new(terminal, candidate),
                    Err(InvalidTransition::AlreadyTerminal { from: terminal }),
                );
            }
        }
    }

    #[test]
    fn cancelled_only_reachable_from_pending_or_running() {
        assert!(RunTransition::is_allowed(Pending, Cancelled));
        assert!(RunTransition::is_allowed(Running, Cancelled));
        assert!(!RunTransition::is_allowed(Success, Cancelled));
    }
}
