// crates/mesaplane-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Metadata Store
// Description: MetadataStore implementation over a single SQLite file.
// Purpose: Durable control-plane persistence: one writer thread serializes
//          mutations, a round-robin pool of read-only connections serves reads.
// Dependencies: mesaplane-core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! Every mutation is submitted as a boxed closure to the [`WriteGateway`],
//! which runs it on the single writer connection. Reads are dispatched to
//! whichever connection in the pool is next in round-robin order, via
//! `spawn_blocking` so the Tokio runtime is never blocked on file I/O.
//! [`SqliteMetadataStore::create_run_and_advance_schedule`] and
//! [`SqliteMetadataStore::create_run_and_advance_trigger`] wrap the run
//! insert and the schedule/trigger bookkeeping update in an explicit
//! `BEGIN IMMEDIATE` / `COMMIT` / `ROLLBACK` inside the closure submitted to
//! the writer, so a crash between the two writes cannot happen. Other
//! multi-statement mutations in this file (e.g. `delete_pipeline`'s cascading
//! deletes) run as separate statements on the same writer thread and are not
//! wrapped in a transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use mesaplane_core::LandingFile;
use mesaplane_core::LandingFileId;
use mesaplane_core::LandingZone;
use mesaplane_core::LandingZoneId;
use mesaplane_core::Layer;
use mesaplane_core::ListParams;
use mesaplane_core::MetadataStore;
use mesaplane_core::Namespace;
use mesaplane_core::NamespaceId;
use mesaplane_core::Page;
use mesaplane_core::Pipeline;
use mesaplane_core::PipelineId;
use mesaplane_core::PipelineKind;
use mesaplane_core::QualityResult;
use mesaplane_core::QualityResultId;
use mesaplane_core::QualityTest;
use mesaplane_core::QualityTestId;
use mesaplane_core::RetentionOverrides;
use mesaplane_core::Run;
use mesaplane_core::RunId;
use mesaplane_core::RunStatus;
use mesaplane_core::Schedule;
use mesaplane_core::ScheduleId;
use mesaplane_core::StoreError;
use mesaplane_core::Trigger;
use mesaplane_core::TriggerConfig;
use mesaplane_core::TriggerId;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::params;
use uuid::Uuid;

use crate::codec;
use crate::gateway::WriteGateway;
use crate::schema;

// ============================================================================
// SECTION: Store
// ============================================================================

/// SQLite-backed [`MetadataStore`].
///
/// # Invariants
/// - `writer` is the only connection that ever executes a mutating statement.
/// - `readers` connections are opened read-only and never mutate the file.
pub struct SqliteMetadataStore {
    writer: WriteGateway,
    readers: Arc<Vec<Mutex<Connection>>>,
    next_reader: AtomicUsize,
}

impl SqliteMetadataStore {
    /// Opens (creating if absent) the database at `path`, applies the schema,
    /// and starts the writer thread plus a pool of `read_pool_size` read-only
    /// connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] when the file cannot be opened or the
    /// schema cannot be applied.
    pub fn open(path: &Path, read_pool_size: usize) -> Result<Self, StoreError> {
        let writer_conn = Connection::open(path)
            .map_err(|err| StoreError::Internal(format!("opening sqlite writer connection: {err}")))?;
        writer_conn
            .pragma_update(None, "journal_mode", "WAL")
            .map_err(|err| StoreError::Internal(format!("enabling WAL: {err}")))?;
        writer_conn
            .pragma_update(None, "foreign_keys", "ON")
            .map_err(|err| StoreError::Internal(format!("enabling foreign keys: {err}")))?;
        schema::apply(&writer_conn)
            .map_err(|err| StoreError::Internal(format!("applying schema: {err}")))?;

        let mut readers = Vec::with_capacity(read_pool_size.max(1));
        for _ in 0..read_pool_size.max(1) {
            let conn = Connection::open(path)
                .map_err(|err| StoreError::Internal(format!("opening sqlite read connection: {err}")))?;
            conn.pragma_update(None, "query_only", "ON")
                .map_err(|err| StoreError::Internal(format!("enabling query_only: {err}")))?;
            readers.push(Mutex::new(conn));
        }

        Ok(Self {
            writer: WriteGateway::spawn(writer_conn),
            readers: Arc::new(readers),
            next_reader: AtomicUsize::new(0),
        })
    }

    /// Runs `f` against the next read-only connection in round-robin order.
    async fn with_read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let readers = Arc::clone(&self.readers);
        let index = self.next_reader.fetch_add(1, Ordering::Relaxed) % readers.len();
        tokio::task::spawn_blocking(move || {
            let conn = readers[index].lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            f(&conn)
        })
        .await
        .map_err(|err| StoreError::Internal(format!("read task panicked: {err}")))?
    }
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(raw).map_err(|err| StoreError::Internal(format!("corrupt {what} uuid: {err}")))
}

fn row_to_namespace(row: &Row<'_>) -> Result<Namespace, StoreError> {
    let id_raw = codec::get_string(row, "id")?;
    Ok(Namespace {
        id: NamespaceId::try_from(id_raw).map_err(|err| StoreError::Internal(err.to_string()))?,
        created_at: codec::ts_from_string(&codec::get_string(row, "created_at")?)?,
    })
}

fn row_to_pipeline(row: &Row<'_>) -> Result<Pipeline, StoreError> {
    let layer = match codec::get_string(row, "layer")?.as_str() {
        "bronze" => Layer::Bronze,
        "silver" => Layer::Silver,
        "gold" => Layer::Gold,
        other => return Err(StoreError::Internal(format!("corrupt layer column: {other}"))),
    };
    let kind = match codec::get_string(row, "kind")?.as_str() {
        "sql" => PipelineKind::Sql,
        "script" => PipelineKind::Script,
        other => return Err(StoreError::Internal(format!("corrupt kind column: {other}"))),
    };
    Ok(Pipeline {
        id: PipelineId::from_uuid(parse_uuid(&codec::get_string(row, "id")?, "pipeline")?),
        namespace: NamespaceId::try_from(codec::get_string(row, "namespace")?)
            .map_err(|err| StoreError::Internal(err.to_string()))?,
        layer,
        name: codec::get_string(row, "name")?,
        kind,
        storage_prefix: codec::get_string(row, "storage_prefix")?,
        description: codec::get_opt_string(row, "description")?,
        owner: codec::get_opt_string(row, "owner")?,
        created_at: codec::ts_from_string(&codec::get_string(row, "created_at")?)?,
        updated_at: codec::ts_from_string(&codec::get_string(row, "updated_at")?)?,
        deleted_at: codec::opt_ts_from_string(codec::get_opt_string(row, "deleted_at")?)?,
        retention_overrides: RetentionOverrides {
            max_runs_per_pipeline: opt_u32(row, "retention_max_runs")?,
            max_age_days: opt_u32(row, "retention_max_age_days")?,
            log_retention_days: opt_u32(row, "retention_log_days")?,
            quality_history_per_test: opt_u32(row, "retention_quality_history")?,
        },
    })
}

#[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation, reason = "retention overrides are always non-negative by construction")]
fn opt_u32(row: &Row<'_>, idx: &str) -> Result<Option<u32>, StoreError> {
    Ok(codec::get_opt_i64(row, idx)?.map(|raw| raw as u32))
}

fn run_status_to_str(status: RunStatus) -> &'static str {
    status.as_str()
}

fn run_status_from_str(raw: &str) -> Result<RunStatus, StoreError> {
    match raw {
        "pending" => Ok(RunStatus::Pending),
        "running" => Ok(RunStatus::Running),
        "success" => Ok(RunStatus::Success),
        "failed" => Ok(RunStatus::Failed),
        "cancelled" => Ok(RunStatus::Cancelled),
        other => Err(StoreError::Internal(format!("corrupt status column: {other}"))),
    }
}

fn row_to_run(row: &Row<'_>) -> Result<Run, StoreError> {
    Ok(Run {
        id: RunId::from_uuid(parse_uuid(&codec::get_string(row, "id")?, "run")?),
        pipeline_id: PipelineId::from_uuid(parse_uuid(&codec::get_string(row, "pipeline_id")?, "pipeline")?),
        status: run_status_from_str(&codec::get_string(row, "status")?)?,
        trigger: codec::get_string(row, "trigger")?,
        started_at: codec::opt_ts_from_string(codec::get_opt_string(row, "started_at")?)?,
        finished_at: codec::opt_ts_from_string(codec::get_opt_string(row, "finished_at")?)?,
        duration_ms: codec::get_opt_i64(row, "duration_ms")?,
        rows_written: codec::get_opt_i64(row, "rows_written")?,
        error: codec::get_opt_string(row, "error")?,
        logs_uri: codec::get_opt_string(row, "logs_uri")?,
        created_at: codec::ts_from_string(&codec::get_string(row, "created_at")?)?,
    })
}

fn row_to_schedule(row: &Row<'_>) -> Result<Schedule, StoreError> {
    Ok(Schedule {
        id: ScheduleId::from_uuid(parse_uuid(&codec::get_string(row, "id")?, "schedule")?),
        pipeline_id: PipelineId::from_uuid(parse_uuid(&codec::get_string(row, "pipeline_id")?, "pipeline")?),
        cron_expr: codec::get_string(row, "cron_expr")?,
        enabled: codec::get_bool(row, "enabled")?,
        last_run_id: codec::get_opt_string(row, "last_run_id")?
            .map(|raw| parse_uuid(&raw, "run"))
            .transpose()?
            .map(RunId::from_uuid),
        last_run_at: codec::opt_ts_from_string(codec::get_opt_string(row, "last_run_at")?)?,
        next_run_at: codec::opt_ts_from_string(codec::get_opt_string(row, "next_run_at")?)?,
    })
}

fn row_to_trigger(row: &Row<'_>) -> Result<Trigger, StoreError> {
    let config_json = codec::get_string(row, "config_json")?;
    let config: TriggerConfig = serde_json::from_str(&config_json)
        .map_err(|err| StoreError::Internal(format!("corrupt trigger config: {err}")))?;
    Ok(Trigger {
        id: TriggerId::from_uuid(parse_uuid(&codec::get_string(row, "id")?, "trigger")?),
        pipeline_id: PipelineId::from_uuid(parse_uuid(&codec::get_string(row, "pipeline_id")?, "pipeline")?),
        config,
        enabled: codec::get_bool(row, "enabled")?,
        #[allow(clippy::cast_sign_loss, reason = "cooldown_seconds is always non-negative by construction")]
        cooldown_seconds: codec::get_i64(row, "cooldown_seconds")? as u64,
        last_triggered_at: codec::opt_ts_from_string(codec::get_opt_string(row, "last_triggered_at")?)?,
        last_run_id: codec::get_opt_string(row, "last_run_id")?
            .map(|raw| parse_uuid(&raw, "run"))
            .transpose()?
            .map(RunId::from_uuid),
    })
}

fn row_to_landing_zone(row: &Row<'_>) -> Result<LandingZone, StoreError> {
    Ok(LandingZone {
        id: LandingZoneId::from_uuid(parse_uuid(&codec::get_string(row, "id")?, "landing_zone")?),
        namespace: NamespaceId::try_from(codec::get_string(row, "namespace")?)
            .map_err(|err| StoreError::Internal(err.to_string()))?,
        name: codec::get_string(row, "name")?,
        created_at: codec::ts_from_string(&codec::get_string(row, "created_at")?)?,
    })
}

fn row_to_landing_file(row: &Row<'_>) -> Result<LandingFile, StoreError> {
    Ok(LandingFile {
        id: LandingFileId::from_uuid(parse_uuid(&codec::get_string(row, "id")?, "landing_file")?),
        zone_id: LandingZoneId::from_uuid(parse_uuid(&codec::get_string(row, "zone_id")?, "landing_zone")?),
        filename: codec::get_string(row, "filename")?,
        object_uri: codec::get_string(row, "object_uri")?,
        #[allow(clippy::cast_sign_loss, reason = "size_bytes is always non-negative by construction")]
        size_bytes: codec::get_i64(row, "size_bytes")? as u64,
        uploaded_at: codec::ts_from_string(&codec::get_string(row, "uploaded_at")?)?,
    })
}

fn row_to_quality_test(row: &Row<'_>) -> Result<QualityTest, StoreError> {
    Ok(QualityTest {
        id: QualityTestId::from_uuid(parse_uuid(&codec::get_string(row, "id")?, "quality_test")?),
        pipeline_id: PipelineId::from_uuid(parse_uuid(&codec::get_string(row, "pipeline_id")?, "pipeline")?),
        name: codec::get_string(row, "name")?,
        expression: codec::get_string(row, "expression")?,
    })
}

fn row_to_quality_result(row: &Row<'_>) -> Result<QualityResult, StoreError> {
    Ok(QualityResult {
        id: QualityResultId::from_uuid(parse_uuid(&codec::get_string(row, "id")?, "quality_result")?),
        test_id: QualityTestId::from_uuid(parse_uuid(&codec::get_string(row, "test_id")?, "quality_test")?),
        run_id: RunId::from_uuid(parse_uuid(&codec::get_string(row, "run_id")?, "run")?),
        passed: codec::get_bool(row, "passed")?,
        detail: codec::get_opt_string(row, "detail")?,
        recorded_at: codec::ts_from_string(&codec::get_string(row, "recorded_at")?)?,
    })
}

fn insert_run(conn: &Connection, run: &Run) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO runs
         (id, pipeline_id, status, trigger, started_at, finished_at, duration_ms,
          rows_written, error, logs_uri, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            run.id.to_string(),
            run.pipeline_id.to_string(),
            run_status_to_str(run.status),
            run.trigger,
            codec::opt_ts_to_string(run.started_at),
            codec::opt_ts_to_string(run.finished_at),
            run.duration_ms,
            run.rows_written,
            run.error,
            run.logs_uri,
            codec::ts_to_string(run.created_at),
        ],
    )?;
    Ok(())
}

fn update_schedule_row(conn: &Connection, schedule: &Schedule) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE schedules SET cron_expr = ?2, enabled = ?3, last_run_id = ?4,
                last_run_at = ?5, next_run_at = ?6
         WHERE id = ?1",
        params![
            schedule.id.to_string(),
            schedule.cron_expr,
            schedule.enabled,
            schedule.last_run_id.map(|id| id.to_string()),
            codec::opt_ts_to_string(schedule.last_run_at),
            codec::opt_ts_to_string(schedule.next_run_at),
        ],
    )
}

fn update_trigger_row(conn: &Connection, trigger: &Trigger) -> Result<usize, StoreError> {
    let config_json = serde_json::to_string(&trigger.config).map_err(|err| StoreError::Internal(err.to_string()))?;
    conn.execute(
        "UPDATE triggers SET config_json = ?2, enabled = ?3, cooldown_seconds = ?4,
                last_triggered_at = ?5, last_run_id = ?6
         WHERE id = ?1",
        params![
            trigger.id.to_string(),
            config_json,
            trigger.enabled,
            #[allow(clippy::cast_possible_wrap, reason = "cooldown_seconds never approaches i64::MAX")]
            (trigger.cooldown_seconds as i64),
            codec::opt_ts_to_string(trigger.last_triggered_at),
            trigger.last_run_id.map(|id| id.to_string()),
        ],
    )
    .map_err(map_rusqlite)
}

fn map_rusqlite(err: rusqlite::Error) -> StoreError {
    StoreError::Internal(format!("sqlite error: {err}"))
}

// ============================================================================
// SECTION: MetadataStore Implementation
// ============================================================================

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn ensure_namespace(&self, id: &NamespaceId) -> Result<Namespace, StoreError> {
        let id = id.clone();
        self.writer
            .submit(move |conn| {
                let now = codec::ts_to_string(time::OffsetDateTime::now_utc());
                conn.execute(
                    "INSERT INTO namespaces (id, created_at) VALUES (?1, ?2)
                     ON CONFLICT(id) DO NOTHING",
                    params![id.as_str(), now],
                )
                .map_err(map_rusqlite)?;
                let mut stmt = conn
                    .prepare("SELECT id, created_at FROM namespaces WHERE id = ?1")
                    .map_err(map_rusqlite)?;
                stmt.query_row(params![id.as_str()], row_to_namespace_sql)
                    .map_err(map_rusqlite)?
            })
            .await
    }

    async fn list_namespaces(&self, params: ListParams) -> Result<Page<Namespace>, StoreError> {
        self.with_read(move |conn| {
            let total: u64 = conn
                .query_row("SELECT COUNT(*) FROM namespaces", [], |row| row.get(0))
                .map_err(map_rusqlite)?;
            let mut stmt = conn
                .prepare("SELECT id, created_at FROM namespaces ORDER BY id LIMIT ?1 OFFSET ?2")
                .map_err(map_rusqlite)?;
            let items = stmt
                .query_map(rusqlite::params![params.limit, params.offset], row_to_namespace_sql)
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect::<Result<Vec<_>, StoreError>>()?;
            Ok(Page::new(items, total))
        })
        .await
    }

    async fn delete_namespace(&self, id: &NamespaceId) -> Result<(), StoreError> {
        let id = id.clone();
        self.writer
            .submit(move |conn| {
                let affected =
                    conn.execute("DELETE FROM namespaces WHERE id = ?1", params![id.as_str()]).map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("namespace {id} not found")));
                }
                Ok(())
            })
            .await
    }

    async fn create_pipeline(&self, pipeline: Pipeline) -> Result<Pipeline, StoreError> {
        self.writer
            .submit(move |conn| {
                let existing: Option<i64> = conn
                    .query_row(
                        "SELECT 1 FROM pipelines WHERE namespace = ?1 AND layer = ?2 AND name = ?3
                         AND deleted_at IS NULL",
                        params![pipeline.namespace.as_str(), pipeline.layer.as_str(), pipeline.name],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(map_rusqlite)?;
                if existing.is_some() {
                    return Err(StoreError::Conflict(format!(
                        "pipeline {}/{}/{} already exists",
                        pipeline.namespace,
                        pipeline.layer.as_str(),
                        pipeline.name
                    )));
                }
                conn.execute(
                    "INSERT INTO pipelines
                     (id, namespace, layer, name, kind, storage_prefix, description, owner,
                      created_at, updated_at, deleted_at,
                      retention_max_runs, retention_max_age_days, retention_log_days, retention_quality_history)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    params![
                        pipeline.id.to_string(),
                        pipeline.namespace.as_str(),
                        pipeline.layer.as_str(),
                        pipeline.name,
                        match pipeline.kind {
                            PipelineKind::Sql => "sql",
                            PipelineKind::Script => "script",
                        },
                        pipeline.storage_prefix,
                        pipeline.description,
                        pipeline.owner,
                        codec::ts_to_string(pipeline.created_at),
                        codec::ts_to_string(pipeline.updated_at),
                        codec::opt_ts_to_string(pipeline.deleted_at),
                        pipeline.retention_overrides.max_runs_per_pipeline,
                        pipeline.retention_overrides.max_age_days,
                        pipeline.retention_overrides.log_retention_days,
                        pipeline.retention_overrides.quality_history_per_test,
                    ],
                )
                .map_err(map_rusqlite)?;
                Ok(pipeline)
            })
            .await
    }

    async fn get_pipeline(&self, id: PipelineId) -> Result<Option<Pipeline>, StoreError> {
        self.with_read(move |conn| {
            conn.query_row(
                "SELECT id, namespace, layer, name, kind, storage_prefix, description, owner,
                        created_at, updated_at, deleted_at,
                        retention_max_runs, retention_max_age_days, retention_log_days, retention_quality_history
                 FROM pipelines WHERE id = ?1",
                params![id.to_string()],
                row_to_pipeline_sql,
            )
            .optional()
            .map_err(map_rusqlite)?
            .transpose()
        })
        .await
    }

    async fn list_pipelines(
        &self,
        namespace: &NamespaceId,
        include_deleted: bool,
        params: ListParams,
    ) -> Result<Page<Pipeline>, StoreError> {
        let namespace = namespace.clone();
        self.with_read(move |conn| {
            let filter = if include_deleted { "" } else { "AND deleted_at IS NULL" };
            let count_sql = format!("SELECT COUNT(*) FROM pipelines WHERE namespace = ?1 {filter}");
            let total: u64 = conn
                .query_row(&count_sql, rusqlite::params![namespace.as_str()], |row| row.get(0))
                .map_err(map_rusqlite)?;
            let list_sql = format!(
                "SELECT id, namespace, layer, name, kind, storage_prefix, description, owner,
                        created_at, updated_at, deleted_at,
                        retention_max_runs, retention_max_age_days, retention_log_days, retention_quality_history
                 FROM pipelines WHERE namespace = ?1 {filter}
                 ORDER BY created_at LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&list_sql).map_err(map_rusqlite)?;
            let items = stmt
                .query_map(rusqlite::params![namespace.as_str(), params.limit, params.offset], row_to_pipeline_sql)
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect::<Result<Vec<_>, StoreError>>()?;
            Ok(Page::new(items, total))
        })
        .await
    }

    async fn update_pipeline(&self, pipeline: Pipeline) -> Result<Pipeline, StoreError> {
        self.writer
            .submit(move |conn| {
                let affected = conn
                    .execute(
                        "UPDATE pipelines SET description = ?2, owner = ?3, updated_at = ?4,
                         retention_max_runs = ?5, retention_max_age_days = ?6,
                         retention_log_days = ?7, retention_quality_history = ?8
                         WHERE id = ?1",
                        params![
                            pipeline.id.to_string(),
                            pipeline.description,
                            pipeline.owner,
                            codec::ts_to_string(pipeline.updated_at),
                            pipeline.retention_overrides.max_runs_per_pipeline,
                            pipeline.retention_overrides.max_age_days,
                            pipeline.retention_overrides.log_retention_days,
                            pipeline.retention_overrides.quality_history_per_test,
                        ],
                    )
                    .map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("pipeline {} not found", pipeline.id)));
                }
                Ok(pipeline)
            })
            .await
    }

    async fn delete_pipeline(&self, id: PipelineId) -> Result<(), StoreError> {
        self.writer
            .submit(move |conn| {
                let now = codec::ts_to_string(time::OffsetDateTime::now_utc());
                let affected = conn
                    .execute(
                        "UPDATE pipelines SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
                        params![id.to_string(), now],
                    )
                    .map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("pipeline {id} not found")));
                }
                conn.execute("DELETE FROM schedules WHERE pipeline_id = ?1", params![id.to_string()])
                    .map_err(map_rusqlite)?;
                conn.execute("DELETE FROM triggers WHERE pipeline_id = ?1", params![id.to_string()])
                    .map_err(map_rusqlite)?;
                conn.execute("DELETE FROM quality_tests WHERE pipeline_id = ?1", params![id.to_string()])
                    .map_err(map_rusqlite)?;
                Ok(())
            })
            .await
    }

    async fn create_run(&self, run: Run) -> Result<Run, StoreError> {
        self.writer
            .submit(move |conn| {
                insert_run(conn, &run).map_err(map_rusqlite)?;
                Ok(run)
            })
            .await
    }

    async fn create_run_and_advance_schedule(
        &self,
        run: Run,
        schedule: Schedule,
    ) -> Result<(Run, Schedule), StoreError> {
        self.writer
            .submit(move |conn| {
                conn.execute_batch("BEGIN IMMEDIATE").map_err(map_rusqlite)?;
                let result = (|| {
                    insert_run(conn, &run).map_err(map_rusqlite)?;
                    let affected = update_schedule_row(conn, &schedule).map_err(map_rusqlite)?;
                    if affected == 0 {
                        return Err(StoreError::NotFound(format!("schedule {} not found", schedule.id)));
                    }
                    Ok(())
                })();
                match result {
                    Ok(()) => {
                        conn.execute_batch("COMMIT").map_err(map_rusqlite)?;
                        Ok((run, schedule))
                    }
                    Err(err) => {
                        conn.execute_batch("ROLLBACK").ok();
                        Err(err)
                    }
                }
            })
            .await
    }

    async fn create_run_and_advance_trigger(
        &self,
        run: Run,
        trigger: Trigger,
    ) -> Result<(Run, Trigger), StoreError> {
        self.writer
            .submit(move |conn| {
                conn.execute_batch("BEGIN IMMEDIATE").map_err(map_rusqlite)?;
                let result = (|| {
                    insert_run(conn, &run).map_err(map_rusqlite)?;
                    let affected = update_trigger_row(conn, &trigger)?;
                    if affected == 0 {
                        return Err(StoreError::NotFound(format!("trigger {} not found", trigger.id)));
                    }
                    Ok(())
                })();
                match result {
                    Ok(()) => {
                        conn.execute_batch("COMMIT").map_err(map_rusqlite)?;
                        Ok((run, trigger))
                    }
                    Err(err) => {
                        conn.execute_batch("ROLLBACK").ok();
                        Err(err)
                    }
                }
            })
            .await
    }

    async fn get_run(&self, id: RunId) -> Result<Option<Run>, StoreError> {
        self.with_read(move |conn| {
            conn.query_row(
                "SELECT id, pipeline_id, status, trigger, started_at, finished_at, duration_ms,
                        rows_written, error, logs_uri, created_at
                 FROM runs WHERE id = ?1",
                params![id.to_string()],
                row_to_run_sql,
            )
            .optional()
            .map_err(map_rusqlite)?
            .transpose()
        })
        .await
    }

    async fn list_runs(
        &self,
        namespace: Option<&NamespaceId>,
        status: Option<RunStatus>,
        params: ListParams,
    ) -> Result<Page<Run>, StoreError> {
        let namespace = namespace.cloned();
        self.with_read(move |conn| {
            let mut where_clauses = Vec::new();
            if namespace.is_some() {
                where_clauses.push("p.namespace = ?1".to_string());
            }
            if status.is_some() {
                let idx = if namespace.is_some() { 2 } else { 1 };
                where_clauses.push(format!("r.status = ?{idx}"));
            }
            let where_sql =
                if where_clauses.is_empty() { String::new() } else { format!("WHERE {}", where_clauses.join(" AND ")) };

            let base = format!("FROM runs r JOIN pipelines p ON p.id = r.pipeline_id {where_sql}");

            let total: u64 = {
                let sql = format!("SELECT COUNT(*) {base}");
                let mut stmt = conn.prepare(&sql).map_err(map_rusqlite)?;
                bind_run_count(&mut stmt, &namespace, status)?
            };

            let sql = format!(
                "SELECT r.id, r.pipeline_id, r.status, r.trigger, r.started_at, r.finished_at,
                        r.duration_ms, r.rows_written, r.error, r.logs_uri, r.created_at
                 {base} ORDER BY r.created_at DESC LIMIT ? OFFSET ?"
            );
            let mut stmt = conn.prepare(&sql).map_err(map_rusqlite)?;
            let items = bind_run_list(&mut stmt, &namespace, status, params)?;
            Ok(Page::new(items, total))
        })
        .await
    }

    async fn transition_run(&self, id: RunId, expected_current: RunStatus, updated: Run) -> Result<Run, StoreError> {
        self.writer
            .submit(move |conn| {
                let affected = conn
                    .execute(
                        "UPDATE runs SET status = ?2, started_at = ?3, finished_at = ?4, duration_ms = ?5,
                                rows_written = ?6, error = ?7, logs_uri = ?8
                         WHERE id = ?1 AND status = ?9",
                        params![
                            id.to_string(),
                            run_status_to_str(updated.status),
                            codec::opt_ts_to_string(updated.started_at),
                            codec::opt_ts_to_string(updated.finished_at),
                            updated.duration_ms,
                            updated.rows_written,
                            updated.error,
                            updated.logs_uri,
                            run_status_to_str(expected_current),
                        ],
                    )
                    .map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::Conflict(format!(
                        "run {id} is no longer in status {}",
                        expected_current.as_str()
                    )));
                }
                Ok(updated)
            })
            .await
    }

    async fn delete_run(&self, id: RunId) -> Result<(), StoreError> {
        self.writer
            .submit(move |conn| {
                let affected =
                    conn.execute("DELETE FROM runs WHERE id = ?1", params![id.to_string()]).map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("run {id} not found")));
                }
                Ok(())
            })
            .await
    }

    async fn create_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        self.writer
            .submit(move |conn| {
                conn.execute(
                    "INSERT INTO schedules
                     (id, pipeline_id, cron_expr, enabled, last_run_id, last_run_at, next_run_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        schedule.id.to_string(),
                        schedule.pipeline_id.to_string(),
                        schedule.cron_expr,
                        schedule.enabled,
                        schedule.last_run_id.map(|id| id.to_string()),
                        codec::opt_ts_to_string(schedule.last_run_at),
                        codec::opt_ts_to_string(schedule.next_run_at),
                    ],
                )
                .map_err(map_rusqlite)?;
                Ok(schedule)
            })
            .await
    }

    async fn list_all_schedules(&self) -> Result<Vec<Schedule>, StoreError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, pipeline_id, cron_expr, enabled, last_run_id, last_run_at, next_run_at
                     FROM schedules",
                )
                .map_err(map_rusqlite)?;
            stmt.query_map([], row_to_schedule_sql)
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect()
        })
        .await
    }

    async fn list_schedules(&self, pipeline_id: PipelineId, params: ListParams) -> Result<Page<Schedule>, StoreError> {
        self.with_read(move |conn| {
            let total: u64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM schedules WHERE pipeline_id = ?1",
                    rusqlite::params![pipeline_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(map_rusqlite)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, pipeline_id, cron_expr, enabled, last_run_id, last_run_at, next_run_at
                     FROM schedules WHERE pipeline_id = ?1 LIMIT ?2 OFFSET ?3",
                )
                .map_err(map_rusqlite)?;
            let items = stmt
                .query_map(
                    rusqlite::params![pipeline_id.to_string(), params.limit, params.offset],
                    row_to_schedule_sql,
                )
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect::<Result<Vec<_>, StoreError>>()?;
            Ok(Page::new(items, total))
        })
        .await
    }

    async fn update_schedule(&self, schedule: Schedule) -> Result<Schedule, StoreError> {
        self.writer
            .submit(move |conn| {
                let affected = update_schedule_row(conn, &schedule).map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("schedule {} not found", schedule.id)));
                }
                Ok(schedule)
            })
            .await
    }

    async fn delete_schedule(&self, id: ScheduleId) -> Result<(), StoreError> {
        self.writer
            .submit(move |conn| {
                let affected =
                    conn.execute("DELETE FROM schedules WHERE id = ?1", params![id.to_string()]).map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("schedule {id} not found")));
                }
                Ok(())
            })
            .await
    }

    async fn create_trigger(&self, trigger: Trigger) -> Result<Trigger, StoreError> {
        self.writer
            .submit(move |conn| {
                let config_json =
                    serde_json::to_string(&trigger.config).map_err(|err| StoreError::Internal(err.to_string()))?;
                conn.execute(
                    "INSERT INTO triggers
                     (id, pipeline_id, config_json, enabled, cooldown_seconds, last_triggered_at, last_run_id)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        trigger.id.to_string(),
                        trigger.pipeline_id.to_string(),
                        config_json,
                        trigger.enabled,
                        #[allow(clippy::cast_possible_wrap, reason = "cooldown_seconds never approaches i64::MAX")]
                        (trigger.cooldown_seconds as i64),
                        codec::opt_ts_to_string(trigger.last_triggered_at),
                        trigger.last_run_id.map(|id| id.to_string()),
                    ],
                )
                .map_err(map_rusqlite)?;
                Ok(trigger)
            })
            .await
    }

    async fn list_enabled_triggers(&self) -> Result<Vec<Trigger>, StoreError> {
        self.with_read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, pipeline_id, config_json, enabled, cooldown_seconds, last_triggered_at, last_run_id
                     FROM triggers WHERE enabled = 1",
                )
                .map_err(map_rusqlite)?;
            stmt.query_map([], row_to_trigger_sql)
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect()
        })
        .await
    }

    async fn list_triggers(&self, pipeline_id: PipelineId, params: ListParams) -> Result<Page<Trigger>, StoreError> {
        self.with_read(move |conn| {
            let total: u64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM triggers WHERE pipeline_id = ?1",
                    rusqlite::params![pipeline_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(map_rusqlite)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, pipeline_id, config_json, enabled, cooldown_seconds, last_triggered_at, last_run_id
                     FROM triggers WHERE pipeline_id = ?1 LIMIT ?2 OFFSET ?3",
                )
                .map_err(map_rusqlite)?;
            let items = stmt
                .query_map(
                    rusqlite::params![pipeline_id.to_string(), params.limit, params.offset],
                    row_to_trigger_sql,
                )
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect::<Result<Vec<_>, StoreError>>()?;
            Ok(Page::new(items, total))
        })
        .await
    }

    async fn update_trigger(&self, trigger: Trigger) -> Result<Trigger, StoreError> {
        self.writer
            .submit(move |conn| {
                let affected = update_trigger_row(conn, &trigger)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("trigger {} not found", trigger.id)));
                }
                Ok(trigger)
            })
            .await
    }

    async fn delete_trigger(&self, id: TriggerId) -> Result<(), StoreError> {
        self.writer
            .submit(move |conn| {
                let affected =
                    conn.execute("DELETE FROM triggers WHERE id = ?1", params![id.to_string()]).map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("trigger {id} not found")));
                }
                Ok(())
            })
            .await
    }

    async fn create_landing_zone(&self, zone: LandingZone) -> Result<LandingZone, StoreError> {
        self.writer
            .submit(move |conn| {
                conn.execute(
                    "INSERT INTO landing_zones (id, namespace, name, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        zone.id.to_string(),
                        zone.namespace.as_str(),
                        zone.name,
                        codec::ts_to_string(zone.created_at),
                    ],
                )
                .map_err(map_rusqlite)?;
                Ok(zone)
            })
            .await
    }

    async fn list_landing_zones(
        &self,
        namespace: &NamespaceId,
        params: ListParams,
    ) -> Result<Page<LandingZone>, StoreError> {
        let namespace = namespace.clone();
        self.with_read(move |conn| {
            let total: u64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM landing_zones WHERE namespace = ?1",
                    rusqlite::params![namespace.as_str()],
                    |row| row.get(0),
                )
                .map_err(map_rusqlite)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, namespace, name, created_at FROM landing_zones
                     WHERE namespace = ?1 LIMIT ?2 OFFSET ?3",
                )
                .map_err(map_rusqlite)?;
            let items = stmt
                .query_map(
                    rusqlite::params![namespace.as_str(), params.limit, params.offset],
                    row_to_landing_zone_sql,
                )
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect::<Result<Vec<_>, StoreError>>()?;
            Ok(Page::new(items, total))
        })
        .await
    }

    async fn record_landing_file(&self, file: LandingFile) -> Result<LandingFile, StoreError> {
        self.writer
            .submit(move |conn| {
                conn.execute(
                    "INSERT INTO landing_files (id, zone_id, filename, object_uri, size_bytes, uploaded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        file.id.to_string(),
                        file.zone_id.to_string(),
                        file.filename,
                        file.object_uri,
                        #[allow(clippy::cast_possible_wrap, reason = "size_bytes never approaches i64::MAX")]
                        (file.size_bytes as i64),
                        codec::ts_to_string(file.uploaded_at),
                    ],
                )
                .map_err(map_rusqlite)?;
                Ok(file)
            })
            .await
    }

    async fn list_landing_files(
        &self,
        zone_id: LandingZoneId,
        params: ListParams,
    ) -> Result<Page<LandingFile>, StoreError> {
        self.with_read(move |conn| {
            let total: u64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM landing_files WHERE zone_id = ?1",
                    rusqlite::params![zone_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(map_rusqlite)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, zone_id, filename, object_uri, size_bytes, uploaded_at
                     FROM landing_files WHERE zone_id = ?1 ORDER BY uploaded_at DESC LIMIT ?2 OFFSET ?3",
                )
                .map_err(map_rusqlite)?;
            let items = stmt
                .query_map(
                    rusqlite::params![zone_id.to_string(), params.limit, params.offset],
                    row_to_landing_file_sql,
                )
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect::<Result<Vec<_>, StoreError>>()?;
            Ok(Page::new(items, total))
        })
        .await
    }

    async fn create_quality_test(&self, test: QualityTest) -> Result<QualityTest, StoreError> {
        self.writer
            .submit(move |conn| {
                conn.execute(
                    "INSERT INTO quality_tests (id, pipeline_id, name, expression) VALUES (?1, ?2, ?3, ?4)",
                    params![test.id.to_string(), test.pipeline_id.to_string(), test.name, test.expression],
                )
                .map_err(map_rusqlite)?;
                Ok(test)
            })
            .await
    }

    async fn list_quality_tests(
        &self,
        pipeline_id: PipelineId,
        params: ListParams,
    ) -> Result<Page<QualityTest>, StoreError> {
        self.with_read(move |conn| {
            let total: u64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM quality_tests WHERE pipeline_id = ?1",
                    rusqlite::params![pipeline_id.to_string()],
                    |row| row.get(0),
                )
                .map_err(map_rusqlite)?;
            let mut stmt = conn
                .prepare(
                    "SELECT id, pipeline_id, name, expression FROM quality_tests
                     WHERE pipeline_id = ?1 LIMIT ?2 OFFSET ?3",
                )
                .map_err(map_rusqlite)?;
            let items = stmt
                .query_map(
                    rusqlite::params![pipeline_id.to_string(), params.limit, params.offset],
                    row_to_quality_test_sql,
                )
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect::<Result<Vec<_>, StoreError>>()?;
            Ok(Page::new(items, total))
        })
        .await
    }

    async fn record_quality_result(&self, result: QualityResult) -> Result<QualityResult, StoreError> {
        self.writer
            .submit(move |conn| {
                conn.execute(
                    "INSERT INTO quality_results (id, test_id, run_id, passed, detail, recorded_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        result.id.to_string(),
                        result.test_id.to_string(),
                        result.run_id.to_string(),
                        result.passed,
                        result.detail,
                        codec::ts_to_string(result.recorded_at),
                    ],
                )
                .map_err(map_rusqlite)?;
                Ok(result)
            })
            .await
    }

    async fn latest_quality_results(&self, pipeline_id: PipelineId) -> Result<Vec<QualityResult>, StoreError> {
        self.with_read(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT qr.id, qr.test_id, qr.run_id, qr.passed, qr.detail, qr.recorded_at
                     FROM quality_results qr
                     JOIN (
                         SELECT test_id, MAX(recorded_at) AS max_recorded
                         FROM quality_results
                         GROUP BY test_id
                     ) latest ON latest.test_id = qr.test_id AND latest.max_recorded = qr.recorded_at
                     JOIN quality_tests qt ON qt.id = qr.test_id
                     WHERE qt.pipeline_id = ?1",
                )
                .map_err(map_rusqlite)?;
            stmt.query_map(params![pipeline_id.to_string()], row_to_quality_result_sql)
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect()
        })
        .await
    }

    async fn list_quality_results_for_test(
        &self,
        test_id: QualityTestId,
    ) -> Result<Vec<QualityResult>, StoreError> {
        self.with_read(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, test_id, run_id, passed, detail, recorded_at
                     FROM quality_results WHERE test_id = ?1
                     ORDER BY recorded_at DESC",
                )
                .map_err(map_rusqlite)?;
            stmt.query_map(params![test_id.to_string()], row_to_quality_result_sql)
                .map_err(map_rusqlite)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(map_rusqlite)?
                .into_iter()
                .collect()
        })
        .await
    }

    async fn delete_quality_result(&self, id: QualityResultId) -> Result<(), StoreError> {
        self.writer
            .submit(move |conn| {
                let affected = conn
                    .execute("DELETE FROM quality_results WHERE id = ?1", params![id.to_string()])
                    .map_err(map_rusqlite)?;
                if affected == 0 {
                    return Err(StoreError::NotFound(format!("quality result {id} not found")));
                }
                Ok(())
            })
            .await
    }

    async fn try_acquire_advisory_lock(&self, name: &str, holder: &str) -> Result<bool, StoreError> {
        let name = name.to_string();
        let holder = holder.to_string();
        self.writer
            .submit(move |conn| {
                let now = codec::ts_to_string(time::OffsetDateTime::now_utc());
                let affected = conn
                    .execute(
                        "INSERT INTO advisory_locks (name, holder, acquired_at) VALUES (?1, ?2, ?3)
                         ON CONFLICT(name) DO UPDATE SET holder = excluded.holder, acquired_at = excluded.acquired_at
                         WHERE advisory_locks.holder = excluded.holder",
                        params![name, holder, now],
                    )
                    .map_err(map_rusqlite)?;
                if affected == 1 {
                    return Ok(true);
                }
                let current_holder: Option<String> = conn
                    .query_row("SELECT holder FROM advisory_locks WHERE name = ?1", params![name], |row| row.get(0))
                    .optional()
                    .map_err(map_rusqlite)?;
                Ok(current_holder.as_deref() == Some(holder.as_str()))
            })
            .await
    }

    async fn release_advisory_lock(&self, name: &str, holder: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        let holder = holder.to_string();
        self.writer
            .submit(move |conn| {
                conn.execute("DELETE FROM advisory_locks WHERE name = ?1 AND holder = ?2", params![name, holder])
                    .map_err(map_rusqlite)?;
                Ok(())
            })
            .await
    }

    async fn readiness(&self) -> Result<(), StoreError> {
        self.with_read(|conn| conn.query_row("SELECT 1", [], |_row| Ok(())).map_err(map_rusqlite)).await
    }
}

// ============================================================================
// SECTION: rusqlite Row-Closure Adapters
// ============================================================================

// rusqlite's `query_row`/`query_map` closures must return `rusqlite::Result`;
// the `row_to_*` helpers above return `Result<_, StoreError>` instead, so
// each is wrapped to produce `rusqlite::Result<Result<_, StoreError>>` and
// the outer `StoreError` is unwrapped by the caller with a second `?`.

fn row_to_namespace_sql(row: &Row<'_>) -> rusqlite::Result<Result<Namespace, StoreError>> {
    Ok(row_to_namespace(row))
}

fn row_to_pipeline_sql(row: &Row<'_>) -> rusqlite::Result<Result<Pipeline, StoreError>> {
    Ok(row_to_pipeline(row))
}

fn row_to_run_sql(row: &Row<'_>) -> rusqlite::Result<Result<Run, StoreError>> {
    Ok(row_to_run(row))
}

fn row_to_schedule_sql(row: &Row<'_>) -> rusqlite::Result<Result<Schedule, StoreError>> {
    Ok(row_to_schedule(row))
}

fn row_to_trigger_sql(row: &Row<'_>) -> rusqlite::Result<Result<Trigger, StoreError>> {
    Ok(row_to_trigger(row))
}

fn row_to_landing_zone_sql(row: &Row<'_>) -> rusqlite::Result<Result<LandingZone, StoreError>> {
    Ok(row_to_landing_zone(row))
}

fn row_to_landing_file_sql(row: &Row<'_>) -> rusqlite::Result<Result<LandingFile, StoreError>> {
    Ok(row_to_landing_file(row))
}

fn row_to_quality_test_sql(row: &Row<'_>) -> rusqlite::Result<Result<QualityTest, StoreError>> {
    Ok(row_to_quality_test(row))
}

fn row_to_quality_result_sql(row: &Row<'_>) -> rusqlite::Result<Result<QualityResult, StoreError>> {
    Ok(row_to_quality_result(row))
}

/// Binds the optional namespace/status filters shared by `list_runs`'s count
/// query, in positional order.
fn bind_run_count(
    stmt: &mut rusqlite::Statement<'_>,
    namespace: &Option<NamespaceId>,
    status: Option<RunStatus>,
) -> Result<u64, StoreError> {
    match (namespace, status) {
        (Some(ns), Some(st)) => stmt.query_row(params![ns.as_str(), st.as_str()], |row| row.get(0)),
        (Some(ns), None) => stmt.query_row(params![ns.as_str()], |row| row.get(0)),
        (None, Some(st)) => stmt.query_row(params![st.as_str()], |row| row.get(0)),
        (None, None) => stmt.query_row([], |row| row.get(0)),
    }
    .map_err(map_rusqlite)
}

/// Binds the optional namespace/status filters plus pagination for
/// `list_runs`'s row query, in positional order.
fn bind_run_list(
    stmt: &mut rusqlite::Statement<'_>,
    namespace: &Option<NamespaceId>,
    status: Option<RunStatus>,
    params: ListParams,
) -> Result<Vec<Run>, StoreError> {
    let rows = match (namespace, status) {
        (Some(ns), Some(st)) => {
            stmt.query_map(rusqlite::params![ns.as_str(), st.as_str(), params.limit, params.offset], row_to_run_sql)
        }
        (Some(ns), None) => stmt.query_map(rusqlite::params![ns.as_str(), params.limit, params.offset], row_to_run_sql),
        (None, Some(st)) => stmt.query_map(rusqlite::params![st.as_str(), params.limit, params.offset], row_to_run_sql),
        (None, None) => stmt.query_map(rusqlite::params![params.limit, params.offset], row_to_run_sql),
    }
    .map_err(map_rusqlite)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(map_rusqlite)?.into_iter().collect()
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use mesaplane_core::Layer;
    use mesaplane_core::PipelineId;
    use mesaplane_core::PipelineKind;
    use mesaplane_core::RunId;
    use time::OffsetDateTime;

    use super::*;

    fn open_temp() -> (tempfile::TempDir, SqliteMetadataStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteMetadataStore::open(&dir.path().join("store.db"), 2).expect("open store");
        (dir, store)
    }

    fn sample_pipeline(namespace: &NamespaceId) -> Pipeline {
        let now = OffsetDateTime::now_utc();
        Pipeline {
            id: PipelineId::new(),
            namespace: namespace.clone(),
            layer: Layer::Bronze,
            name: "orders".to_string(),
            kind: PipelineKind::Sql,
            storage_prefix: format!("{namespace}/pipelines/bronze/orders"),
            description: None,
            owner: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            retention_overrides: mesaplane_core::RetentionOverrides::default(),
        }
    }

    #[tokio::test]
    async fn ensure_namespace_is_idempotent() {
        let (_dir, store) = open_temp();
        let id = NamespaceId::new("sales").unwrap();
        let first = store.ensure_namespace(&id).await.unwrap();
        let second = store.ensure_namespace(&id).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn create_pipeline_rejects_duplicate_identity() {
        let (_dir, store) = open_temp();
        let ns = NamespaceId::new("sales").unwrap();
        store.ensure_namespace(&ns).await.unwrap();
        let pipeline = sample_pipeline(&ns);
        store.create_pipeline(pipeline.clone()).await.unwrap();
        let duplicate = sample_pipeline(&ns);
        let err = store.create_pipeline(duplicate).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn transition_run_rejects_stale_expected_status() {
        let (_dir, store) = open_temp();
        let ns = NamespaceId::new("sales").unwrap();
        store.ensure_namespace(&ns).await.unwrap();
        let pipeline = store.create_pipeline(sample_pipeline(&ns)).await.unwrap();
        let now = OffsetDateTime::now_utc();
        let run = Run {
            id: RunId::new(),
            pipeline_id: pipeline.id,
            status: RunStatus::Pending,
            trigger: "manual".to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            rows_written: None,
            error: None,
            logs_uri: None,
            created_at: now,
        };
        let run = store.create_run(run).await.unwrap();
        let mut running = run.clone();
        running.status = RunStatus::Running;
        running.started_at = Some(now);
        let running = store.transition_run(run.id, RunStatus::Pending, running).await.unwrap();
        assert_eq!(running.status, RunStatus::Running);

        let mut bogus = running.clone();
        bogus.status = RunStatus::Success;
        let err = store.transition_run(run.id, RunStatus::Pending, bogus).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn advisory_lock_is_exclusive_to_first_holder() {
        let (_dir, store) = open_temp();
        assert!(store.try_acquire_advisory_lock("leader", "node-a").await.unwrap());
        assert!(!store.try_acquire_advisory_lock("leader", "node-b").await.unwrap());
        assert!(store.try_acquire_advisory_lock("leader", "node-a").await.unwrap());
        store.release_advisory_lock("leader", "node-a").await.unwrap();
        assert!(store.try_acquire_advisory_lock("leader", "node-b").await.unwrap());
    }

    #[tokio::test]
    async fn readiness_succeeds_against_an_open_store() {
        let (_dir, store) = open_temp();
        store.readiness().await.unwrap();
    }
}
