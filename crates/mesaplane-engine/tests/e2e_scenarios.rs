// crates/mesaplane-engine/tests/e2e_scenarios.rs
// ============================================================================
// Module: Run Engine End-to-End Scenarios
// Description: Black-box tests driving RunEngine, Scheduler, and
//              TriggerEvaluator through their public API over a real SQLite
//              store, mirroring the suite's seeded E2E scenarios.
// Purpose: Exercise the components wired together the way the Request Layer
//          and Bootstrap chain do, rather than one collaborator at a time.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use mesaplane_core::Executor;
use mesaplane_core::ExecutorError;
use mesaplane_core::ExecutorStatus;
use mesaplane_core::Layer;
use mesaplane_core::ListParams;
use mesaplane_core::LogEntry;
use mesaplane_core::MetadataStore;
use mesaplane_core::NamespaceId;
use mesaplane_core::Pipeline;
use mesaplane_core::PipelineId;
use mesaplane_core::PipelineKind;
use mesaplane_core::RunDescriptor;
use mesaplane_core::RunId;
use mesaplane_core::RunStatus;
use mesaplane_core::Schedule;
use mesaplane_engine::RunEngine;
use mesaplane_engine::Scheduler;
use mesaplane_store_sqlite::SqliteMetadataStore;
use time::OffsetDateTime;
use tokio::sync::oneshot;

fn test_pipeline(name: &str) -> Pipeline {
    let now = OffsetDateTime::now_utc();
    Pipeline {
        id: PipelineId::new(),
        namespace: NamespaceId::new("acme").expect("slug"),
        layer: Layer::Bronze,
        name: name.to_string(),
        kind: PipelineKind::Sql,
        storage_prefix: format!("acme/bronze/{name}"),
        description: None,
        owner: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        retention_overrides: mesaplane_core::RetentionOverrides::default(),
    }
}

async fn open_store(dir: &tempfile::TempDir, name: &str) -> Arc<SqliteMetadataStore> {
    Arc::new(SqliteMetadataStore::open(&dir.path().join(name), 1).expect("open store"))
}

struct ScriptedExecutor {
    status: Mutex<RunStatus>,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn submit(&self, _descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn get_status(&self, _run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
        let status = *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(ExecutorStatus { status, rows_written: Some(42), error: None })
    }

    async fn stream_logs(&self, _run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError> {
        Ok(Vec::new())
    }

    async fn cancel(&self, _run_id: RunId) -> Result<(), ExecutorError> {
        Ok(())
    }

    fn implementation_label(&self) -> &'static str {
        "scripted"
    }
}

/// Scenario 1: happy-path run reaches `success` and fires `OnRunComplete`
/// exactly once.
#[tokio::test]
async fn happy_path_run_reaches_success_and_completes_once() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "happy-path.sqlite3").await;
    let pipeline = store.create_pipeline(test_pipeline("orders")).await.expect("create pipeline");

    let executor = Arc::new(ScriptedExecutor { status: Mutex::new(RunStatus::Success) });
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = RunEngine::new(Arc::clone(&store) as Arc<dyn MetadataStore>, executor, tx);

    let run = engine.submit(&pipeline, "manual").await.expect("submit");
    assert_eq!(run.status, RunStatus::Running);

    engine.poll_once().await;
    let completed = rx.recv().await.expect("completion notification");
    assert_eq!(completed.status, RunStatus::Success);
    assert!(completed.duration_ms.unwrap_or(0) > 0);

    // A second poll against an already-closed run sends no further
    // completion notification.
    engine.poll_once().await;
    assert!(rx.try_recv().is_err(), "OnRunComplete must fire exactly once");

    let fetched = store.get_run(run.id).await.expect("get run").expect("run exists");
    assert_eq!(fetched.id, run.id);
    assert_eq!(fetched.status, RunStatus::Success);
}

/// Scenario 2: a schedule overdue by nearly a day fires exactly one run on
/// the next tick, and re-ticking immediately submits nothing further.
#[tokio::test]
async fn schedule_catches_up_exactly_once_per_overdue_window() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "catch-up.sqlite3").await;
    let pipeline = store.create_pipeline(test_pipeline("orders")).await.expect("create pipeline");

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

    let executor = Arc::new(ScriptedExecutor { status: Mutex::new(RunStatus::Success) });
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Arc::new(RunEngine::new(Arc::clone(&store) as Arc<dyn MetadataStore>, executor, tx));
    let scheduler = Scheduler::new(Arc::clone(&store) as Arc<dyn MetadataStore>, Arc::clone(&engine));

    scheduler.tick().await.expect("first tick");

    let runs = store
        .list_runs(Some(&pipeline.namespace), None, ListParams::new(Some(10), None))
        .await
        .expect("list runs");
    assert_eq!(runs.items.len(), 1, "exactly one run should fire for the missed window");
    assert_eq!(runs.items[0].trigger, "schedule:*/5 * * * *");

    let all_schedules = store.list_all_schedules().await.expect("list schedules");
    let refreshed = all_schedules.into_iter().find(|s| s.id == schedule.id).expect("schedule exists");
    assert!(refreshed.next_run_at.expect("advanced") > now, "next_run_at must advance strictly past now");

    scheduler.tick().await.expect("second tick");
    let runs_after = store
        .list_runs(Some(&pipeline.namespace), None, ListParams::new(Some(10), None))
        .await
        .expect("list runs again");
    assert_eq!(runs_after.items.len(), 1, "re-ticking immediately submits no additional run");
}

/// Scenario 4: cancelling a run while it is still `pending` (dispatch still
/// in flight) transitions straight to `cancelled` without an intervening
/// `running`, and never calls the executor's cancel RPC.
#[tokio::test]
async fn cancel_while_pending_skips_running_and_never_calls_cancel_rpc() {
    struct BlockingExecutor {
        release: Mutex<Option<oneshot::Receiver<()>>>,
        cancel_calls: Mutex<u32>,
    }

    #[async_trait]
    impl Executor for BlockingExecutor {
        async fn submit(&self, _descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
            let receiver = self.release.lock().unwrap_or_else(std::sync::PoisonError::into_inner).take();
            if let Some(receiver) = receiver {
                let _ignored = receiver.await;
            }
            Ok(())
        }

        async fn get_status(&self, _run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
            Ok(ExecutorStatus { status: RunStatus::Running, rows_written: None, error: None })
        }

        async fn stream_logs(&self, _run_id: RunId) -> Result<Vec<LogEntry>, ExecutorError> {
            Ok(Vec::new())
        }

        async fn cancel(&self, _run_id: RunId) -> Result<(), ExecutorError> {
            *self.cancel_calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
            Ok(())
        }

        fn implementation_label(&self) -> &'static str {
            "blocking"
        }
    }

    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "cancel-pending.sqlite3").await;
    let pipeline = store.create_pipeline(test_pipeline("orders")).await.expect("create pipeline");

    let (release_tx, release_rx) = oneshot::channel();
    let executor =
        Arc::new(BlockingExecutor { release: Mutex::new(Some(release_rx)), cancel_calls: Mutex::new(0) });
    let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Arc::new(RunEngine::new(Arc::clone(&store) as Arc<dyn MetadataStore>, Arc::clone(&executor), tx));

    let pending = RunEngine::<BlockingExecutor>::build_pending_run(&pipeline, "manual");
    let pending = store.create_run(pending).await.expect("create pending run");
    let run_id = pending.id;

    let dispatching = {
        let engine = Arc::clone(&engine);
        let pipeline = pipeline.clone();
        tokio::spawn(async move { engine.dispatch(&pipeline, pending).await })
    };

    // The dispatch task is blocked inside `executor.submit`; the run is
    // still `pending` in the store, so cancel takes the immediate path.
    let cancelled = engine.cancel(run_id).await.expect("cancel pending run");
    assert_eq!(cancelled.status, RunStatus::Cancelled);
    assert!(cancelled.finished_at.is_some());

    let _ignored = release_tx.send(());
    let _ignored = dispatching.await.expect("dispatch task joins");

    assert_eq!(*executor.cancel_calls.lock().unwrap_or_else(std::sync::PoisonError::into_inner), 0);

    let fetched = store.get_run(run_id).await.expect("get run").expect("run exists");
    assert_eq!(fetched.status, RunStatus::Cancelled, "a losing dispatch CAS must not resurrect the run as running");
}
