// crates/mesaplane-store-sqlite/src/lib.rs
// ============================================================================
// Module: Mesaplane SQLite Store
// Description: SQLite-backed implementation of mesaplane-core::MetadataStore.
// Purpose: Durable control-plane persistence behind a single-writer gateway
//          and a round-robin read pool, both serialized through one file.
// Dependencies: mesaplane-core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! This crate has exactly one production consumer: `mesaplane-engine` and
//! `mesaplane-server` depend on it only through the
//! [`mesaplane_core::MetadataStore`] trait object, never on
//! [`SqliteMetadataStore`] directly, so the backend can be swapped without
//! touching call sites.

pub mod codec;
pub mod gateway;
pub mod schema;
pub mod store;

pub use gateway::WriteGateway;
pub use store::SqliteMetadataStore;
