// crates/mesaplane-engine/src/reaper.rs
// ============================================================================
// Module: Reaper
// Description: Background cleaner: prunes old runs, expires log artifacts,
//              force-fails stuck runs, and deletes orphaned catalog branches.
// Purpose: Bound the size of operational state without an operator having
//          to intervene.
// Dependencies: mesaplane-core, tokio
// ============================================================================

//! ## Overview
//! [`Reaper::tick`] runs five sweeps in sequence; each sweep's `Result` is
//! logged independently so a failure in one does not block the others from
//! running. [`mesaplane_core::Pipeline::retention_overrides`] merges
//! field-by-field over the system-wide [`ReaperConfig`] for the run-pruning,
//! log-expiry, and quality-history sweeps. Catalog-branch cleanup has no
//! per-pipeline override: `CatalogClient::list_branches` returns bare branch
//! ids with no creation timestamp to gate an age threshold against, so that
//! sweep stays system-wide (unconditional on orphan/terminal status).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use mesaplane_core::CatalogClient;
use mesaplane_core::ListParams;
use mesaplane_core::MetadataStore;
use mesaplane_core::ObjectStore;
use mesaplane_core::Run;
use mesaplane_core::RunStatus;
use time::OffsetDateTime;
use tokio::sync::oneshot;

/// System-wide retention and cadence parameters for the Reaper.
///
/// Mirrors `mesaplane_config::RetentionConfig`; kept as a standalone type
/// here so `mesaplane-engine` does not depend on the config-parsing crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaperConfig {
    /// Maximum Run rows retained per pipeline.
    pub max_runs_per_pipeline: u32,
    /// Maximum Run row age, in days.
    pub max_age_days: u32,
    /// Log artifact retention, in days.
    pub log_retention_days: u32,
    /// Minutes a `running` run may go without progress before being
    /// force-failed.
    pub stuck_timeout_minutes: u64,
    /// Tick cadence, in minutes.
    pub interval_minutes: u64,
}

impl ReaperConfig {
    /// Returns the configured tick cadence as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

/// Prefix used for ephemeral catalog branches created per run.
const CATALOG_RUN_BRANCH_PREFIX: &str = "run-";

/// Runs the four retention sweeps on a fixed cadence.
pub struct Reaper {
    store: Arc<dyn MetadataStore>,
    object_store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn CatalogClient>,
    config: ReaperConfig,
}

impl Reaper {
    /// Builds a Reaper over `store`, `object_store`, and `catalog`, using
    /// `config` for every sweep's thresholds.
    #[must_use]
    pub fn new(
        store: Arc<dyn MetadataStore>,
        object_store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn CatalogClient>,
        config: ReaperConfig,
    ) -> Self {
        Self { store, object_store, catalog, config }
    }

    /// Runs all five sweeps once. Each sweep runs on its own spawned task so
    /// a panic in one cannot unwind into the others — the async equivalent
    /// of wrapping each in `catch_unwind`, since a panicking task only
    /// unwinds its own task and reports the panic through its `JoinHandle`.
    pub async fn tick(&self) {
        let store = Arc::clone(&self.store);
        let config = self.config;
        Self::spawn_isolated("prune_old_runs", prune_old_runs(store, config)).await;

        let store = Arc::clone(&self.store);
        let object_store = Arc::clone(&self.object_store);
        let config = self.config;
        Self::spawn_isolated("expire_logs", expire_logs(store, object_store, config)).await;

        let store = Arc::clone(&self.store);
        let config = self.config;
        Self::spawn_isolated("fail_stuck_runs", fail_stuck_runs(store, config)).await;

        let store = Arc::clone(&self.store);
        Self::spawn_isolated("prune_quality_history", prune_quality_history(store)).await;

        let store = Arc::clone(&self.store);
        let catalog = Arc::clone(&self.catalog);
        Self::spawn_isolated("cleanup_catalog_branches", cleanup_catalog_branches(store, catalog)).await;
    }

    async fn spawn_isolated<F>(sweep_name: &'static str, sweep: F)
    where
        F: std::future::Future<Output = Result<(), SweepError>> + Send + 'static,
    {
        match tokio::spawn(sweep).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::warn!(sweep = sweep_name, error = %err, "reaper sweep failed"),
            Err(join_err) => {
                tracing::warn!(sweep = sweep_name, error = %join_err, "reaper sweep task did not complete");
            }
        }
    }

    /// Spawns the ticker, ticking every [`ReaperConfig::interval`] until
    /// `stop` resolves.
    pub fn spawn(self: &Arc<Self>, mut stop: oneshot::Receiver<()>) -> tokio::task::JoinHandle<()> {
        let reaper = Arc::clone(self);
        let interval = reaper.config.interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => reaper.tick().await,
                    _ = &mut stop => break,
                }
            }
        })
    }
}

/// Deletes Run rows beyond `max_runs_per_pipeline` or older than
/// `max_age_days`, oldest first. Both thresholds merge the owning
/// pipeline's [`mesaplane_core::RetentionOverrides`] over `config`.
async fn prune_old_runs(store: Arc<dyn MetadataStore>, config: ReaperConfig) -> Result<(), SweepError> {
    let namespaces = store.list_namespaces(ListParams::new(Some(500), None)).await?;
    for namespace in namespaces.items {
        let pipelines = store.list_pipelines(&namespace.id, false, ListParams::new(Some(500), None)).await?;
        let runs = store.list_runs(Some(&namespace.id), None, ListParams::new(Some(500), None)).await?;
        for pipeline in pipelines.items {
            let overrides = pipeline.retention_overrides;
            let max_runs = overrides.max_runs_per_pipeline.unwrap_or(config.max_runs_per_pipeline);
            let max_age_days = overrides.max_age_days.unwrap_or(config.max_age_days);
            let age_cutoff = OffsetDateTime::now_utc() - Duration::from_secs(u64::from(max_age_days) * 86_400);
            let mut terminal: Vec<&Run> =
                runs.items.iter().filter(|run| run.pipeline_id == pipeline.id && run.status.is_terminal()).collect();
            terminal.sort_by_key(|run| run.created_at);
            let keep_from = terminal.len().saturating_sub(max_runs as usize);
            for (index, run) in terminal.iter().enumerate() {
                let over_count_limit = index < keep_from;
                let over_age_limit = run.created_at < age_cutoff;
                if over_count_limit || over_age_limit {
                    store.delete_run(run.id).await?;
                }
            }
        }
    }
    Ok(())
}

/// Deletes the object-store log artifact for any terminal run whose
/// `finished_at` is older than `log_retention_days`, then clears its
/// `logs_uri`. The threshold merges the owning pipeline's
/// [`mesaplane_core::RetentionOverrides`] over `config`.
async fn expire_logs(
    store: Arc<dyn MetadataStore>,
    object_store: Arc<dyn ObjectStore>,
    config: ReaperConfig,
) -> Result<(), SweepError> {
    let namespaces = store.list_namespaces(ListParams::new(Some(500), None)).await?;
    for namespace in namespaces.items {
        let pipelines = store.list_pipelines(&namespace.id, true, ListParams::new(Some(500), None)).await?;
        let runs = store.list_runs(Some(&namespace.id), None, ListParams::new(Some(500), None)).await?;
        for run in runs.items {
            let Some(logs_uri) = run.logs_uri.clone() else { continue };
            let Some(finished_at) = run.finished_at else { continue };
            let log_retention_days = pipelines
                .items
                .iter()
                .find(|pipeline| pipeline.id == run.pipeline_id)
                .and_then(|pipeline| pipeline.retention_overrides.log_retention_days)
                .unwrap_or(config.log_retention_days);
            let cutoff = OffsetDateTime::now_utc() - Duration::from_secs(u64::from(log_retention_days) * 86_400);
            if finished_at >= cutoff {
                continue;
            }
            if let Err(err) = object_store.delete(&logs_uri).await {
                tracing::warn!(error = %err, "failed to delete expired log artifact");
                continue;
            }
            let cleared = Run { logs_uri: None, ..run.clone() };
            store.transition_run(run.id, run.status, cleared).await.ok();
        }
    }
    Ok(())
}

/// Deletes `QualityResult` rows beyond a pipeline's
/// `quality_history_per_test` override, newest-first per test. Pipelines
/// with no override configured are left untouched — there is no
/// system-wide default for quality history, only an opt-in per-pipeline cap.
async fn prune_quality_history(store: Arc<dyn MetadataStore>) -> Result<(), SweepError> {
    let namespaces = store.list_namespaces(ListParams::new(Some(500), None)).await?;
    for namespace in namespaces.items {
        let pipelines = store.list_pipelines(&namespace.id, false, ListParams::new(Some(500), None)).await?;
        for pipeline in pipelines.items {
            let Some(keep) = pipeline.retention_overrides.quality_history_per_test else { continue };
            let tests = store.list_quality_tests(pipeline.id, ListParams::new(Some(500), None)).await?;
            for test in tests.items {
                let results = store.list_quality_results_for_test(test.id).await?;
                for result in results.into_iter().skip(keep as usize) {
                    store.delete_quality_result(result.id).await?;
                }
            }
        }
    }
    Ok(())
}

/// Force-transitions any `running` run past `stuck_timeout_minutes` since
/// `started_at` into `failed`.
async fn fail_stuck_runs(store: Arc<dyn MetadataStore>, config: ReaperConfig) -> Result<(), SweepError> {
    let cutoff = OffsetDateTime::now_utc() - Duration::from_secs(config.stuck_timeout_minutes * 60);
    let page = store.list_runs(None, Some(RunStatus::Running), ListParams::new(Some(500), None)).await?;
    for run in page.items {
        let Some(started_at) = run.started_at else { continue };
        if started_at >= cutoff {
            continue;
        }
        let now = OffsetDateTime::now_utc();
        let updated = Run {
            status: RunStatus::Failed,
            finished_at: Some(now),
            error: Some("stuck: no progress".to_string()),
            ..run.clone()
        };
        store.transition_run(run.id, RunStatus::Running, updated).await?;
    }
    Ok(())
}

/// Deletes catalog branches under the ephemeral run-branch prefix whose run
/// id is absent from the Store or is terminal.
async fn cleanup_catalog_branches(
    store: Arc<dyn MetadataStore>,
    catalog: Arc<dyn CatalogClient>,
) -> Result<(), SweepError> {
    let branches = catalog.list_branches(CATALOG_RUN_BRANCH_PREFIX).await?;
    for branch in branches {
        let Some(run_id_str) = branch.branch_id.strip_prefix(CATALOG_RUN_BRANCH_PREFIX) else { continue };
        let Ok(run_uuid) = uuid::Uuid::parse_str(run_id_str) else { continue };
        let run_id = mesaplane_core::RunId::from_uuid(run_uuid);
        let orphaned = match store.get_run(run_id).await {
            Ok(Some(run)) => run.status.is_terminal(),
            Ok(None) => true,
            Err(_err) => false,
        };
        if orphaned {
            if let Err(err) = catalog.delete_branch(&branch.branch_id).await {
                tracing::warn!(branch = %branch.branch_id, error = %err, "failed to delete orphan catalog branch");
            }
        }
    }
    Ok(())
}

/// Errors a single sweep can raise; always caught and logged by
/// [`Reaper::spawn_isolated`], never propagated to the caller of `tick`.
#[derive(Debug, thiserror::Error)]
enum SweepError {
    #[error("store error: {0}")]
    Store(#[from] mesaplane_core::StoreError),
    #[error("object store error: {0}")]
    ObjectStore(#[from] mesaplane_core::ObjectStoreError),
    #[error("catalog error: {0}")]
    Catalog(#[from] mesaplane_core::CatalogError),
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
    use mesaplane_core::CatalogBranch;
    use mesaplane_core::CatalogError;
    use mesaplane_core::ObjectStoreError;
    use mesaplane_store_sqlite::SqliteMetadataStore;

    use super::*;

    struct EmptyObjectStore;

    #[async_trait]
    impl ObjectStore for EmptyObjectStore {
        async fn read(&self, _path: &str) -> Result<Vec<u8>, ObjectStoreError> {
            Err(ObjectStoreError::NotFound("unused".to_string()))
        }
        async fn write(&self, _path: &str, _bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
            Ok(())
        }
        async fn delete(&self, _path: &str) -> Result<(), ObjectStoreError> {
            Ok(())
        }
        async fn list(&self, _prefix: &str) -> Result<Vec<String>, ObjectStoreError> {
            Ok(Vec::new())
        }
    }

    struct EmptyCatalogClient;

    #[async_trait]
    impl CatalogClient for EmptyCatalogClient {
        async fn list_branches(&self, _prefix: &str) -> Result<Vec<CatalogBranch>, CatalogError> {
            Ok(Vec::new())
        }
        async fn delete_branch(&self, _branch_id: &str) -> Result<(), CatalogError> {
            Ok(())
        }
    }

    fn test_reaper() -> (Reaper, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("reaper-test.sqlite3");
        let store = Arc::new(SqliteMetadataStore::open(&path, 1).expect("open store"));
        let config = ReaperConfig {
            max_runs_per_pipeline: 5,
            max_age_days: 90,
            log_retention_days: 30,
            stuck_timeout_minutes: 120,
            interval_minutes: 60,
        };
        (Reaper::new(store, Arc::new(EmptyObjectStore), Arc::new(EmptyCatalogClient), config), dir)
    }

    #[tokio::test]
    async fn tick_is_a_no_op_against_an_empty_store() {
        let (reaper, _dir) = test_reaper();
        reaper.tick().await;
    }

    #[tokio::test]
    async fn fail_stuck_runs_force_closes_a_long_running_run() {
        let (reaper, _dir) = test_reaper();
        let now = OffsetDateTime::now_utc();
        let stuck_started = now - Duration::from_secs(200 * 60);
        let run = Run {
            id: mesaplane_core::RunId::new(),
            pipeline_id: mesaplane_core::PipelineId::new(),
            status: RunStatus::Running,
            trigger: "manual".to_string(),
            started_at: Some(stuck_started),
            finished_at: None,
            duration_ms: None,
            rows_written: None,
            error: None,
            logs_uri: None,
            created_at: stuck_started,
        };
        reaper.store.create_run(run.clone()).await.expect("create run");

        fail_stuck_runs(Arc::clone(&reaper.store), reaper.config).await.expect("sweep");

        let reloaded = reaper.store.get_run(run.id).await.expect("get run").expect("run exists");
        assert_eq!(reloaded.status, RunStatus::Failed);
        assert_eq!(reloaded.error.as_deref(), Some("stuck: no progress"));
    }
}
