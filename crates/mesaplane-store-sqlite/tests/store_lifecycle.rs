// crates/mesaplane-store-sqlite/tests/store_lifecycle.rs
// ============================================================================
// Module: SQLite Metadata Store Lifecycle Tests
// Description: Black-box tests over the public MetadataStore surface,
//              treating the crate as an external consumer would.
// Purpose: Cover pagination concatenation, idempotent-create conflict
//          semantics, and the atomic run-creation-plus-bookkeeping paths.
// ============================================================================

#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use mesaplane_core::Layer;
use mesaplane_core::ListParams;
use mesaplane_core::MetadataStore;
use mesaplane_core::NamespaceId;
use mesaplane_core::Pipeline;
use mesaplane_core::PipelineId;
use mesaplane_core::PipelineKind;
use mesaplane_core::Run;
use mesaplane_core::RunId;
use mesaplane_core::RunStatus;
use mesaplane_core::Schedule;
use mesaplane_core::ScheduleId;
use mesaplane_core::StoreError;
use mesaplane_core::Trigger;
use mesaplane_core::TriggerConfig;
use mesaplane_core::TriggerId;
use mesaplane_store_sqlite::SqliteMetadataStore;
use time::OffsetDateTime;

fn open_store(dir: &tempfile::TempDir, name: &str) -> SqliteMetadataStore {
    SqliteMetadataStore::open(&dir.path().join(name), 2).expect("open store")
}

fn sample_pipeline(namespace: &NamespaceId, name: &str) -> Pipeline {
    let now = OffsetDateTime::now_utc();
    Pipeline {
        id: PipelineId::new(),
        namespace: namespace.clone(),
        layer: Layer::Bronze,
        name: name.to_string(),
        kind: PipelineKind::Sql,
        storage_prefix: format!("{namespace}/bronze/{name}"),
        description: None,
        owner: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        retention_overrides: mesaplane_core::RetentionOverrides::default(),
    }
}

fn pending_run(pipeline_id: PipelineId) -> Run {
    let now = OffsetDateTime::now_utc();
    Run {
        id: RunId::new(),
        pipeline_id,
        status: RunStatus::Pending,
        trigger: "manual".to_string(),
        started_at: None,
        finished_at: None,
        duration_ms: None,
        rows_written: None,
        error: None,
        logs_uri: None,
        created_at: now,
    }
}

#[tokio::test]
async fn create_pipeline_rejects_duplicate_identity_as_conflict() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "conflict.sqlite3");
    let ns = NamespaceId::new("sales").expect("slug");
    store.ensure_namespace(&ns).await.expect("ensure namespace");

    store.create_pipeline(sample_pipeline(&ns, "orders")).await.expect("first create");
    let err = store.create_pipeline(sample_pipeline(&ns, "orders")).await.unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)), "duplicate (namespace, layer, name) must conflict, not duplicate");
}

#[tokio::test]
async fn pipeline_pages_concatenate_to_the_full_result_set() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "pagination.sqlite3");
    let ns = NamespaceId::new("sales").expect("slug");
    store.ensure_namespace(&ns).await.expect("ensure namespace");

    for index in 0..7 {
        store.create_pipeline(sample_pipeline(&ns, &format!("pipeline-{index}"))).await.expect("create pipeline");
    }

    let page_size = 3;
    let mut seen = std::collections::HashSet::new();
    let mut offset = 0;
    loop {
        let page = store
            .list_pipelines(&ns, false, ListParams::new(Some(page_size), Some(offset)))
            .await
            .expect("list page");
        assert!(page.items.len() <= page_size as usize);
        if page.items.is_empty() {
            break;
        }
        for pipeline in &page.items {
            assert!(seen.insert(pipeline.id), "pages must not overlap");
        }
        offset += page_size;
    }
    assert_eq!(seen.len(), 7, "consecutive pages must concatenate to the full result set");
}

#[tokio::test]
async fn create_run_and_advance_schedule_is_atomic_on_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "advance-schedule.sqlite3");
    let ns = NamespaceId::new("sales").expect("slug");
    store.ensure_namespace(&ns).await.expect("ensure namespace");
    let pipeline = store.create_pipeline(sample_pipeline(&ns, "orders")).await.expect("create pipeline");

    let schedule = store
        .create_schedule(Schedule {
            id: ScheduleId::new(),
            pipeline_id: pipeline.id,
            cron_expr: "*/5 * * * *".to_string(),
            enabled: true,
            last_run_id: None,
            last_run_at: None,
            next_run_at: Some(OffsetDateTime::now_utc()),
        })
        .await
        .expect("create schedule");

    let run = pending_run(pipeline.id);
    let run_id = run.id;
    let next_fire = OffsetDateTime::now_utc() + time::Duration::minutes(5);
    let advanced = Schedule {
        last_run_id: Some(run_id),
        last_run_at: Some(OffsetDateTime::now_utc()),
        next_run_at: Some(next_fire),
        ..schedule
    };

    let (persisted_run, persisted_schedule) =
        store.create_run_and_advance_schedule(run, advanced).await.expect("atomic create + advance");
    assert_eq!(persisted_run.id, run_id);
    assert_eq!(persisted_schedule.last_run_id, Some(run_id));

    let fetched_run = store.get_run(run_id).await.expect("get run").expect("run row exists");
    assert_eq!(fetched_run.status, RunStatus::Pending);

    let all_schedules = store.list_all_schedules().await.expect("list schedules");
    let fetched_schedule = all_schedules.into_iter().find(|s| s.id == schedule.id).expect("schedule exists");
    assert_eq!(fetched_schedule.last_run_id, Some(run_id));
    assert_eq!(fetched_schedule.next_run_at, Some(next_fire));
}

#[tokio::test]
async fn create_run_and_advance_schedule_rolls_back_run_insert_on_missing_schedule() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "advance-schedule-rollback.sqlite3");
    let ns = NamespaceId::new("sales").expect("slug");
    store.ensure_namespace(&ns).await.expect("ensure namespace");
    let pipeline = store.create_pipeline(sample_pipeline(&ns, "orders")).await.expect("create pipeline");

    let run = pending_run(pipeline.id);
    let run_id = run.id;
    let phantom_schedule = Schedule {
        id: ScheduleId::new(),
        pipeline_id: pipeline.id,
        cron_expr: "*/5 * * * *".to_string(),
        enabled: true,
        last_run_id: Some(run_id),
        last_run_at: None,
        next_run_at: None,
    };

    let err = store.create_run_and_advance_schedule(run, phantom_schedule).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let fetched = store.get_run(run_id).await.expect("get run");
    assert!(fetched.is_none(), "run insert must roll back when the schedule advance fails");
}

#[tokio::test]
async fn create_run_and_advance_trigger_is_atomic_on_success() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "advance-trigger.sqlite3");
    let ns = NamespaceId::new("sales").expect("slug");
    store.ensure_namespace(&ns).await.expect("ensure namespace");
    let pipeline = store.create_pipeline(sample_pipeline(&ns, "orders")).await.expect("create pipeline");

    let trigger = store
        .create_trigger(Trigger {
            id: TriggerId::new(),
            pipeline_id: pipeline.id,
            config: TriggerConfig::Upload { namespace: ns.clone(), zone: "raw".to_string() },
            enabled: true,
            cooldown_seconds: 60,
            last_triggered_at: None,
            last_run_id: None,
        })
        .await
        .expect("create trigger");

    let run = pending_run(pipeline.id);
    let run_id = run.id;
    let fire_time = OffsetDateTime::now_utc();
    let advanced = Trigger { last_triggered_at: Some(fire_time), last_run_id: Some(run_id), ..trigger.clone() };

    let (persisted_run, persisted_trigger) =
        store.create_run_and_advance_trigger(run, advanced).await.expect("atomic create + advance");
    assert_eq!(persisted_run.id, run_id);
    assert_eq!(persisted_trigger.last_run_id, Some(run_id));

    let fetched_run = store.get_run(run_id).await.expect("get run").expect("run row exists");
    assert_eq!(fetched_run.pipeline_id, pipeline.id);

    let fetched_triggers =
        store.list_triggers(pipeline.id, ListParams::new(Some(10), None)).await.expect("list triggers");
    let fetched = fetched_triggers.items.into_iter().find(|t| t.id == trigger.id).expect("trigger exists");
    assert_eq!(fetched.last_triggered_at, Some(fire_time));
    assert_eq!(fetched.last_run_id, Some(run_id));
}

#[tokio::test]
async fn create_run_and_advance_trigger_rolls_back_run_insert_on_missing_trigger() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = open_store(&dir, "advance-trigger-rollback.sqlite3");
    let ns = NamespaceId::new("sales").expect("slug");
    store.ensure_namespace(&ns).await.expect("ensure namespace");
    let pipeline = store.create_pipeline(sample_pipeline(&ns, "orders")).await.expect("create pipeline");

    let run = pending_run(pipeline.id);
    let run_id = run.id;
    let phantom_trigger = Trigger {
        id: TriggerId::new(),
        pipeline_id: pipeline.id,
        config: TriggerConfig::Upload { namespace: ns.clone(), zone: "raw".to_string() },
        enabled: true,
        cooldown_seconds: 60,
        last_triggered_at: Some(OffsetDateTime::now_utc()),
        last_run_id: Some(run_id),
    };

    let err = store.create_run_and_advance_trigger(run, phantom_trigger).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));

    let fetched = store.get_run(run_id).await.expect("get run");
    assert!(fetched.is_none(), "run insert must roll back when the trigger advance fails");
}
