// crates/mesaplane-engine/src/scheduler.rs
// ============================================================================
// Module: Scheduler
// Description: Fires pipeline runs on their 5-field cron bindings.
// Purpose: Translate a cron expression into exactly one run per due window,
//          with catch-up-once semantics across outages.
// Dependencies: mesaplane-core, cron, chrono, tokio
// ============================================================================

//! ## Overview
//! The Scheduler is spawned only on the instance holding the leader advisory
//! lock (see the bootstrap chain); it performs no leader check of its own.
//! Each tick loads every schedule, advances `next_run_at` for schedules that
//! are newly registered, and submits exactly one run for any schedule whose
//! `next_run_at` has passed — then reseats `next_run_at` to the next
//! occurrence strictly after `now`, so an outage spanning several missed
//! windows fires once on recovery rather than backfilling every missed tick.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use cron::Schedule as CronSchedule;
use mesaplane_core::Executor;
use mesaplane_core::MetadataStore;
use mesaplane_core::Schedule;
use mesaplane_core::StoreError;
use time::OffsetDateTime;
use tokio::sync::oneshot;

use crate::engine::RunEngine;

/// Interval between scheduler ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Errors raised while ticking the Scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The store read or write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Fires due cron schedules through a [`RunEngine`].
pub struct Scheduler<E: Executor> {
    store: Arc<dyn MetadataStore>,
    engine: Arc<RunEngine<E>>,
}

impl<E: Executor> Scheduler<E> {
    /// Builds a Scheduler over `store`, submitting due runs through `engine`.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>, engine: Arc<RunEngine<E>>) -> Self {
        Self { store, engine }
    }

    /// Runs one tick of the per-tick algorithm, yielding between schedules
    /// so a slow submit cannot stall the rest of the pass beyond this tick.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] when the initial schedule listing fails;
    /// per-schedule failures (bad cron, submit errors) are logged and do not
    /// abort the tick.
    pub async fn tick(&self) -> Result<(), SchedulerError> {
        let schedules = self.store.list_all_schedules().await?;
        let now = OffsetDateTime::now_utc();
        for schedule in schedules {
            if !schedule.enabled {
                continue;
            }
            self.tick_one(schedule, now).await;
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    async fn tick_one(&self, schedule: Schedule, now: OffsetDateTime) {
        let parsed = match parse_cron(&schedule.cron_expr) {
            Ok(parsed) => parsed,
            Err(_err) => {
                tracing::warn!(schedule = %schedule.id.as_uuid(), expr = %schedule.cron_expr, "invalid cron expression; skipping");
                return;
            }
        };

        let Some(next_run_at) = schedule.next_run_at else {
            let next = next_occurrence_after(&parsed, now);
            let updated = Schedule { next_run_at: Some(next), ..schedule };
            if let Err(err) = self.store.update_schedule(updated).await {
                tracing::warn!(error = %err, "failed to register first-time next_run_at");
            }
            return;
        };

        if next_run_at > now {
            return;
        }

        let Ok(Some(pipeline)) = self.store.get_pipeline(schedule.pipeline_id).await else {
            tracing::warn!(pipeline = %schedule.pipeline_id.as_uuid(), "schedule references missing pipeline");
            return;
        };

        let trigger = format!("schedule:{}", schedule.cron_expr);
        let pending = RunEngine::<E>::build_pending_run(&pipeline, trigger);
        let next = next_occurrence_after(&parsed, now);
        let advanced = Schedule {
            last_run_id: Some(pending.id),
            last_run_at: Some(now),
            next_run_at: Some(next),
            ..schedule
        };

        let run = match self.store.create_run_and_advance_schedule(pending, advanced).await {
            Ok((run, _schedule)) => run,
            Err(err) => {
                tracing::warn!(error = %err, "failed to create run and advance schedule");
                return;
            }
        };

        if let Err(err) = self.engine.dispatch(&pipeline, run).await {
            tracing::warn!(error = %err, "scheduled dispatch failed");
        }
    }

    /// Spawns the ticker, ticking every [`TICK_INTERVAL`] until `stop`
    /// resolves.
    pub fn spawn(self: &Arc<Self>, mut stop: oneshot::Receiver<()>) -> tokio::task::JoinHandle<()>
    where
        E: 'static,
    {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(TICK_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = scheduler.tick().await {
                            tracing::warn!(error = %err, "scheduler tick failed");
                        }
                    }
                    _ = &mut stop => break,
                }
            }
        })
    }
}

/// Parses a 5-field cron expression, adapting it to the `cron` crate's
/// 6-field (seconds-first) grammar by pinning the seconds field to zero.
///
/// # Errors
///
/// Returns the underlying parse error when `expr` is not a valid 5-field
/// cron expression.
pub fn parse_cron(expr: &str) -> Result<CronSchedule, cron::error::Error> {
    CronSchedule::from_str(&format!("0 {expr}"))
}

/// Returns the next occurrence strictly after `from`, per the cron
/// expression `schedule`.
///
/// Shared with the Trigger Evaluator's `cron` and `cron_dependency` kinds,
/// which reuse this math instead of duplicating it.
pub(crate) fn next_occurrence_after(schedule: &CronSchedule, from: OffsetDateTime) -> OffsetDateTime {
    let from_chrono = to_chrono(from);
    schedule.after(&from_chrono).next().map_or_else(|| from + Duration::from_secs(60), from_chrono_dt)
}

fn to_chrono(ts: OffsetDateTime) -> chrono::DateTime<chrono::Utc> {
    let nanos = ts.unix_timestamp_nanos();
    let secs = i64::try_from(nanos.div_euclid(1_000_000_000)).unwrap_or(i64::MAX);
    let subsec = u32::try_from(nanos.rem_euclid(1_000_000_000)).unwrap_or(0);
    chrono::DateTime::from_timestamp(secs, subsec).unwrap_or_else(chrono::Utc::now)
}

fn from_chrono_dt(ts: chrono::DateTime<chrono::Utc>) -> OffsetDateTime {
    let nanos = ts.timestamp_nanos_opt().unwrap_or(0);
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(nanos)).unwrap_or_else(|_| OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use async_trait::async_trait;
    use mesaplane_core::ExecutorError;
    use mesaplane_core::ExecutorStatus;
    use mesaplane_core::Layer;
    use mesaplane_core::LogEntry;
    use mesaplane_core::NamespaceId;
    use mesaplane_core::Pipeline;
    use mesaplane_core::PipelineId;
    use mesaplane_core::PipelineKind;
    use mesaplane_core::RunDescriptor;
    use mesaplane_core::RunId;
    use mesaplane_store_sqlite::SqliteMetadataStore;

    use super::*;

    #[test]
    fn parse_cron_accepts_five_field_expression() {
        assert!(parse_cron("0 * * * *").is_ok());
    }

    #[test]
    fn parse_cron_rejects_malformed_expression() {
        assert!(parse_cron("not a cron").is_err());
    }

    #[test]
    fn next_occurrence_is_strictly_after_now() {
        let schedule = parse_cron("* * * * *").expect("parse");
        let now = OffsetDateTime::now_utc();
        let next = next_occurrence_after(&schedule, now);
        assert!(next > now);
    }

    proptest::proptest! {
        #[test]
        fn next_occurrence_advances_monotonically(minute in 0u32..60, hours_elapsed in 0i64..72) {
            let schedule = parse_cron(&format!("{minute} * * * *")).expect("parse");
            let start = OffsetDateTime::from_unix_timestamp(1_700_000_000).expect("valid timestamp");
            let mut previous = next_occurrence_after(&schedule, start);
            let mut cursor = start;
            for _ in 0..hours_elapsed {
                cursor += Duration::from_secs(3600);
                let next = next_occurrence_after(&schedule, cursor);
                prop_assert!(next > cursor);
                prop_assert!(next >= previous);
                previous = next;
            }
        }
    }

    struct NoopExecutor;

    #[async_trait]
    impl Executor for NoopExecutor {
        async fn submit(&self, _descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
            Ok(())
        }

        async fn get_status(&self, _run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
            Ok(ExecutorStatus { status: mesaplane_core::RunStatus::Running, rows_written: None, error: None })
        }

        async fn stream_logs(&self, _run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError> {
            Ok(Vec::new())
        }

        async fn cancel(&self, _run_id: RunId) -> Result<(), ExecutorError> {
            Ok(())
        }

        fn implementation_label(&self) -> &'static str {
            "noop"
        }
    }

    fn test_store() -> (Arc<SqliteMetadataStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SqliteMetadataStore::open(&dir.path().join("scheduler-test.sqlite3"), 1).expect("open store");
        (Arc::new(store), dir)
    }

    fn test_pipeline() -> Pipeline {
        let now = OffsetDateTime::now_utc();
        Pipeline {
            id: PipelineId::new(),
            namespace: NamespaceId::new("acme").expect("slug"),
            layer: Layer::Bronze,
            name: "orders".to_string(),
            kind: PipelineKind::Sql,
            storage_prefix: "acme/bronze/orders".to_string(),
            description: None,
            owner: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            retention_overrides: mesaplane_core::RetentionOverrides::default(),
        }
    }

    #[tokio::test]
    async fn overdue_schedule_fires_exactly_once_per_tick() {
        let (store, _dir) = test_store();
        let pipeline = store.create_pipeline(test_pipeline()).await.expect("create pipeline");
        let now = OffsetDateTime::now_utc();
        let schedule = store
            .create_schedule(Schedule {
                id: mesaplane_core::ScheduleId::new(),
                pipeline_id: pipeline.id,
                cron_expr: "*/5 * * * *".to_string(),
                enabled: true,
                last_run_id: None,
                last_run_at: None,
                next_run_at: Some(now - time::Duration::hours(23)),
            })
            .await
            .expect("create schedule");

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = Arc::new(RunEngine::new(Arc::clone(&store) as Arc<dyn MetadataStore>, Arc::new(NoopExecutor), tx));
        let scheduler = Scheduler::new(Arc::clone(&store) as Arc<dyn MetadataStore>, Arc::clone(&engine));

        async fn find(store: &SqliteMetadataStore, id: mesaplane_core::ScheduleId) -> Schedule {
            store
                .list_all_schedules()
                .await
                .expect("list schedules")
                .into_iter()
                .find(|candidate| candidate.id == id)
                .expect("schedule exists")
        }

        scheduler.tick().await.expect("first tick");
        let after_first = find(&store, schedule.id).await;
        assert!(after_first.last_run_id.is_some());
        assert!(after_first.next_run_at.expect("next_run_at set") > now);

        scheduler.tick().await.expect("second tick");
        let after_second = find(&store, schedule.id).await;
        assert_eq!(after_second.last_run_id, after_first.last_run_id);
    }
}
