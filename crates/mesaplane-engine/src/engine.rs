// crates/mesaplane-engine/src/engine.rs
// ============================================================================
// Module: Run Engine
// Description: Drives a Run from `pending` through dispatch, polling, and
//              into its terminal state, and services cancel requests.
// Purpose: Own the only code path that writes run status, so the state
//          machine's invariants hold regardless of how many processes run
//          a poll loop concurrently.
// Dependencies: mesaplane-core, tokio
// ============================================================================

//! ## Overview
//! [`RunEngine`] is generic over `E: Executor` rather than holding a `dyn
//! Executor`, keeping the submit/poll hot path monomorphized; the only
//! dynamic dispatch in the run lifecycle lives inside whichever `E` is
//! plugged in (typically `mesaplane_executors::PluginExecutor`, which itself
//! holds the plugin/warm `dyn` boundary). Every status write goes through
//! [`mesaplane_core::MetadataStore::transition_run`], whose
//! compare-and-swap on `expected_current` makes the poll loop and a
//! concurrent cancel request safe to race.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use mesaplane_core::Executor;
use mesaplane_core::ExecutorError;
use mesaplane_core::MetadataStore;
use mesaplane_core::Pipeline;
use mesaplane_core::Run;
use mesaplane_core::RunDescriptor;
use mesaplane_core::RunId;
use mesaplane_core::RunStatus;
use mesaplane_core::StoreError;
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Interval between poll-loop scans of active runs.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Errors raised by [`RunEngine`] operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The underlying store rejected or failed the operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    /// The executor rejected or failed the operation.
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
    /// The run does not exist.
    #[error("run not found: {0:?}")]
    NotFound(RunId),
    /// The run is already terminal; cancel has nothing to do.
    #[error("run {0:?} is already terminal")]
    AlreadyTerminal(RunId),
}

/// Drives runs for a single pipeline kind of executor `E`.
///
/// # Invariants
/// - A run id is a member of the active set if and only if its persisted
///   status is `running` and the poll loop has not yet observed a terminal
///   status for it.
pub struct RunEngine<E: Executor> {
    store: Arc<dyn MetadataStore>,
    executor: Arc<E>,
    active: Mutex<HashSet<RunId>>,
    completions: UnboundedSender<Run>,
}

impl<E: Executor> RunEngine<E> {
    /// Builds a Run Engine over `store` and `executor`, sending every run
    /// that reaches a terminal status on `completions` for the Trigger
    /// Evaluator's `RunComplete` hook.
    #[must_use]
    pub fn new(
        store: Arc<dyn MetadataStore>,
        executor: Arc<E>,
        completions: UnboundedSender<Run>,
    ) -> Self {
        Self { store, executor, active: Mutex::new(HashSet::new()), completions }
    }

    /// Re-populates the active set from persisted `running` rows, for use
    /// right after process start so a restarted poll loop resumes tracking
    /// runs a previous process dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the store read fails.
    pub async fn recover_active(&self) -> Result<(), EngineError> {
        let page = self
            .store
            .list_runs(None, Some(RunStatus::Running), mesaplane_core::ListParams::new(Some(500), None))
            .await?;
        let mut active = self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        active.extend(page.items.iter().map(|run| run.id));
        Ok(())
    }

    /// Builds a fresh `pending` [`Run`] for `pipeline`, with no store write.
    /// Callers that need their own bookkeeping update persisted atomically
    /// alongside run creation (the scheduler, the trigger evaluator) pass the
    /// result to `MetadataStore::create_run_and_advance_schedule` or
    /// `create_run_and_advance_trigger` themselves, then hand the persisted
    /// run to [`Self::dispatch`].
    #[must_use]
    pub fn build_pending_run(pipeline: &Pipeline, trigger: impl Into<String>) -> Run {
        Run {
            id: RunId::new(),
            pipeline_id: pipeline.id,
            status: RunStatus::Pending,
            trigger: trigger.into(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            rows_written: None,
            error: None,
            logs_uri: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Creates a run in `pending`, dispatches it, and moves it to `running`
    /// or, on dispatch failure, directly to `failed`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the initial store write fails.
    pub async fn submit(&self, pipeline: &Pipeline, trigger: impl Into<String>) -> Result<Run, EngineError> {
        let run = self.store.create_run(Self::build_pending_run(pipeline, trigger)).await?;
        self.dispatch(pipeline, run).await
    }

    /// Dispatches an already-persisted `pending` run to the executor and
    /// moves it to `running`, or, on dispatch failure, directly to `failed`.
    ///
    /// Used by callers (the scheduler, the trigger evaluator) that must
    /// persist the run together with their own bookkeeping update in one
    /// store transaction before the executor call happens.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the store write fails.
    pub async fn dispatch(&self, pipeline: &Pipeline, run: Run) -> Result<Run, EngineError> {
        let descriptor = RunDescriptor {
            run_id: run.id,
            pipeline_id: pipeline.id,
            namespace: pipeline.namespace.clone(),
            layer: pipeline.layer,
            storage_prefix: pipeline.storage_prefix.clone(),
            trace_id: Uuid::new_v4().to_string(),
        };

        match self.executor.submit(&descriptor).await {
            Ok(()) => {
                let started = OffsetDateTime::now_utc();
                let updated = Run { status: RunStatus::Running, started_at: Some(started), ..run };
                let updated = self.store.transition_run(updated.id, RunStatus::Pending, updated).await?;
                self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner).insert(updated.id);
                Ok(updated)
            }
            Err(err) => {
                let finished = OffsetDateTime::now_utc();
                let updated = Run {
                    status: RunStatus::Failed,
                    finished_at: Some(finished),
                    error: Some(err.to_string()),
                    ..run
                };
                let updated = self.store.transition_run(updated.id, RunStatus::Pending, updated).await?;
                let _ignored = self.completions.send(updated.clone());
                Ok(updated)
            }
        }
    }

    /// Requests cancellation of `run_id`. A `pending` run is cancelled
    /// immediately with no executor call; a `running` run is cancelled via
    /// [`Executor::cancel`] and only transitioned once that call succeeds,
    /// leaving it for the Reaper to force-close if the executor never
    /// confirms.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NotFound`] when the run is unknown,
    /// [`EngineError::AlreadyTerminal`] when it has already finished, and
    /// [`EngineError::Executor`] when the cancel RPC fails for a running run.
    pub async fn cancel(&self, run_id: RunId) -> Result<Run, EngineError> {
        let run = self.store.get_run(run_id).await?.ok_or(EngineError::NotFound(run_id))?;
        match run.status {
            RunStatus::Pending => {
                let now = OffsetDateTime::now_utc();
                let updated = Run { status: RunStatus::Cancelled, finished_at: Some(now), ..run };
                let updated = self.store.transition_run(run_id, RunStatus::Pending, updated).await?;
                let _ignored = self.completions.send(updated.clone());
                Ok(updated)
            }
            RunStatus::Running => {
                self.executor.cancel(run_id).await?;
                let now = OffsetDateTime::now_utc();
                let updated = Run { status: RunStatus::Cancelled, finished_at: Some(now), ..run };
                let updated = self.store.transition_run(run_id, RunStatus::Running, updated).await?;
                self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&run_id);
                let _ignored = self.completions.send(updated.clone());
                Ok(updated)
            }
            RunStatus::Success | RunStatus::Failed | RunStatus::Cancelled => {
                Err(EngineError::AlreadyTerminal(run_id))
            }
        }
    }

    /// Scans the active set once, polling `E::get_status` for each run and
    /// applying terminal transitions. Transient poll errors are left for
    /// the next scan; the Reaper eventually force-closes a run that never
    /// reports a terminal status.
    pub async fn poll_once(&self) {
        let targets: Vec<RunId> =
            self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner).iter().copied().collect();
        for run_id in targets {
            let status = match self.executor.get_status(run_id).await {
                Ok(status) => status,
                Err(_err) => continue,
            };
            if !status.status.is_terminal() {
                continue;
            }
            let Ok(Some(run)) = self.store.get_run(run_id).await else { continue };
            if run.status.is_terminal() {
                self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&run_id);
                continue;
            }
            let now = OffsetDateTime::now_utc();
            let duration_ms = run
                .started_at
                .map(|started| i64::try_from((now - started).whole_milliseconds()).unwrap_or(i64::MAX));
            let updated = Run {
                status: status.status,
                finished_at: Some(now),
                duration_ms,
                rows_written: status.rows_written,
                error: status.error,
                ..run
            };
            if let Ok(updated) = self.store.transition_run(run_id, RunStatus::Running, updated).await {
                self.active.lock().unwrap_or_else(std::sync::PoisonError::into_inner).remove(&run_id);
                let _ignored = self.completions.send(updated);
            }
        }
    }

    /// Spawns the poll loop, scanning every [`POLL_INTERVAL`] until `stop`
    /// resolves.
    pub fn spawn_poll_loop(self: &Arc<Self>, mut stop: oneshot::Receiver<()>) -> tokio::task::JoinHandle<()>
    where
        E: 'static,
    {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => engine.poll_once().await,
                    _ = &mut stop => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        reason = "Test-only output and panic-based assertions are permitted."
    )]

    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;

    use async_trait::async_trait;
    use mesaplane_core::ExecutorStatus;
    use mesaplane_core::LogEntry;
    use mesaplane_core::Layer;
    use mesaplane_core::NamespaceId;
    use mesaplane_core::PipelineId;
    use mesaplane_core::PipelineKind;
    use mesaplane_store_sqlite::SqliteMetadataStore;

    use super::*;

    struct ScriptedExecutor {
        submit_fails: bool,
        status_after_poll: Mutex<RunStatus>,
        submits: AtomicU32,
    }

    #[async_trait]
    impl Executor for ScriptedExecutor {
        async fn submit(&self, _descriptor: &RunDescriptor) -> Result<(), ExecutorError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            if self.submit_fails {
                return Err(ExecutorError::Rejected("no capacity".to_string()));
            }
            Ok(())
        }

        async fn get_status(&self, _run_id: RunId) -> Result<ExecutorStatus, ExecutorError> {
            let status = *self.status_after_poll.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            Ok(ExecutorStatus { status, rows_written: Some(10), error: None })
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

    fn test_store() -> (Arc<SqliteMetadataStore>, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("engine-test.sqlite3");
        let store = SqliteMetadataStore::open(&path, 1).expect("open store");
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
    async fn submit_failure_marks_run_failed_without_running() {
        let (store, _dir) = test_store();
        let pipeline = store.create_pipeline(test_pipeline()).await.expect("create pipeline");
        let executor = Arc::new(ScriptedExecutor {
            submit_fails: true,
            status_after_poll: Mutex::new(RunStatus::Success),
            submits: AtomicU32::new(0),
        });
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = RunEngine::new(store, executor, tx);

        let run = engine.submit(&pipeline, "manual").await.expect("submit");
        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.error.is_some());
    }

    #[tokio::test]
    async fn successful_submit_registers_run_as_active_and_poll_closes_it() {
        let (store, _dir) = test_store();
        let pipeline = store.create_pipeline(test_pipeline()).await.expect("create pipeline");
        let executor = Arc::new(ScriptedExecutor {
            submit_fails: false,
            status_after_poll: Mutex::new(RunStatus::Success),
            submits: AtomicU32::new(0),
        });
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = RunEngine::new(store, executor, tx);

        let run = engine.submit(&pipeline, "manual").await.expect("submit");
        assert_eq!(run.status, RunStatus::Running);

        engine.poll_once().await;
        let completed = rx.recv().await.expect("completion notification");
        assert_eq!(completed.status, RunStatus::Success);
        assert_eq!(completed.rows_written, Some(10));
    }

    #[tokio::test]
    async fn cancel_on_pending_run_needs_no_executor_call() {
        let (store, _dir) = test_store();
        let pipeline = store.create_pipeline(test_pipeline()).await.expect("create pipeline");
        let executor = Arc::new(ScriptedExecutor {
            submit_fails: true,
            status_after_poll: Mutex::new(RunStatus::Success),
            submits: AtomicU32::new(0),
        });
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = RunEngine::new(Arc::clone(&store), executor, tx);

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
            created_at: OffsetDateTime::now_utc(),
        };
        let run = store.create_run(run).await.expect("create run");

        let cancelled = engine.cancel(run.id).await.expect("cancel");
        assert_eq!(cancelled.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_on_terminal_run_is_rejected() {
        let (store, _dir) = test_store();
        let executor = Arc::new(ScriptedExecutor {
            submit_fails: false,
            status_after_poll: Mutex::new(RunStatus::Success),
            submits: AtomicU32::new(0),
        });
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = RunEngine::new(Arc::clone(&store), executor, tx);

        let run = Run {
            id: RunId::new(),
            pipeline_id: PipelineId::new(),
            status: RunStatus::Success,
            trigger: "manual".to_string(),
            started_at: Some(OffsetDateTime::now_utc()),
            finished_at: Some(OffsetDateTime::now_utc()),
            duration_ms: Some(10),
            rows_written: Some(5),
            error: None,
            logs_uri: None,
            created_at: OffsetDateTime::now_utc(),
        };
        let run = store.create_run(run).await.expect("create run");

        let result = engine.cancel(run.id).await;
        assert!(matches!(result, Err(EngineError::AlreadyTerminal(_))));
    }
}
