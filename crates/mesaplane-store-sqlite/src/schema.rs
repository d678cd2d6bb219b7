// crates/mesaplane-store-sqlite/src/schema.rs
// ============================================================================
// Module: SQLite Schema
// Description: DDL for the metadata store, applied idempotently at bootstrap.
// Purpose: Keep the persisted shape in one reviewable place.
// Dependencies: rusqlite
// ============================================================================

//! ## Overview
//! Migrations are a single idempotent `CREATE TABLE IF NOT EXISTS` batch.
//! There is exactly one schema version today; future migrations should be
//! appended as additional `ALTER TABLE` statements guarded by a
//! `schema_version` row rather than rewritten in place.

use rusqlite::Connection;

/// Applies the full, idempotent schema to `conn`.
///
/// # Errors
///
/// Returns [`rusqlite::Error`] when any statement fails.
pub fn apply(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r"
        CREATE TABLE IF NOT EXISTS namespaces (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pipelines (
            id TEXT PRIMARY KEY,
            namespace TEXT NOT NULL REFERENCES namespaces(id) ON DELETE CASCADE,
            layer TEXT NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            storage_prefix TEXT NOT NULL,
            description TEXT,
            owner TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            deleted_at TEXT,
            retention_max_runs INTEGER,
            retention_max_age_days INTEGER,
            retention_log_days INTEGER,
            retention_quality_history INTEGER
        );
        CREATE UNIQUE INDEX IF NOT EXISTS pipelines_live_identity
            ON pipelines(namespace, layer, name)
            WHERE deleted_at IS NULL;

        CREATE TABLE IF NOT EXISTS runs (
            id TEXT PRIMARY KEY,
            pipeline_id TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            status TEXT NOT NULL,
            trigger TEXT NOT NULL,
            started_at TEXT,
            finished_at TEXT,
            duration_ms INTEGER,
            rows_written INTEGER,
            error TEXT,
            logs_uri TEXT,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS runs_pipeline_idx ON runs(pipeline_id);
        CREATE INDEX IF NOT EXISTS runs_status_idx ON runs(status);

        CREATE TABLE IF NOT EXISTS schedules (
            id TEXT PRIMARY KEY,
            pipeline_id TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            cron_expr TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            last_run_id TEXT,
            last_run_at TEXT,
            next_run_at TEXT
        );

        CREATE TABLE IF NOT EXISTS triggers (
            id TEXT PRIMARY KEY,
            pipeline_id TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            config_json TEXT NOT NULL,
            enabled INTEGER NOT NULL,
            cooldown_seconds INTEGER NOT NULL,
            last_triggered_at TEXT,
            last_run_id TEXT
        );

        CREATE TABLE IF NOT EXISTS landing_zones (
            id TEXT PRIMARY KEY,
            namespace TEXT NOT NULL REFERENCES namespaces(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS landing_files (
            id TEXT PRIMARY KEY,
            zone_id TEXT NOT NULL REFERENCES landing_zones(id) ON DELETE CASCADE,
            filename TEXT NOT NULL,
            object_uri TEXT NOT NULL,
            size_bytes INTEGER NOT NULL,
            uploaded_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quality_tests (
            id TEXT PRIMARY KEY,
            pipeline_id TEXT NOT NULL REFERENCES pipelines(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            expression TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS quality_results (
            id TEXT PRIMARY KEY,
            test_id TEXT NOT NULL REFERENCES quality_tests(id) ON DELETE CASCADE,
            run_id TEXT NOT NULL REFERENCES runs(id) ON DELETE CASCADE,
            passed INTEGER NOT NULL,
            detail TEXT,
            recorded_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS advisory_locks (
            name TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_at TEXT NOT NULL
        );
        ",
    )
}
