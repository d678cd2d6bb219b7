// crates/mesaplane-core/src/core/mod.rs
// ============================================================================
// Module: Mesaplane Core Data Model
// Description: Entity shapes, identifiers, state machine, error taxonomy, pagination.
// Purpose: Group the pure, backend-agnostic core types.
// Dependencies: serde, time, uuid
// ============================================================================

pub mod error;
pub mod identifiers;
pub mod model;
pub mod pagination;
pub mod state;
