// crates/mesaplane-engine/src/triggers.rs
// ============================================================================
// Module: Trigger Evaluator
// Description: Matches inbound events against trigger bindings and submits
//              runs through the cooldown gate.
// Purpose: Turn uploads, run completions, periodic ticks, and webhook POSTs
//          into run submissions without the Request Layer or Run Engine
//          knowing about trigger configuration.
// Dependencies: mesaplane-core, sha2, subtle, tokio
// ============================================================================

//! ## Overview
//! [`TriggerEvaluator::handle_event`] loads every enabled trigger and checks
//! each against the incoming [`mesaplane_core::TriggerEvent`]. A match only
//! fires once its cooldown has elapsed; firing submits a run, tags it
//! `trigger:<kind>:<id>`, and atomically records `last_triggered_at` /
//! `last_run_id` so a flood of identical events cannot double-fire.
//!
//! The `Trigger` entity carries no `next_run_at` field of its own (unlike
//! `Schedule`), so the `cron` and `cron_dependency` kinds compute due-ness
//! from `last_triggered_at` (treated as the Unix epoch before the first
//! fire) using the same occurrence math the Scheduler uses. Webhook tokens
//! are compared in constant time against their stored hash; the raw token
//! is never logged or echoed back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use mesaplane_core::Executor;
use mesaplane_core::ListParams;
use mesaplane_core::MetadataStore;
use mesaplane_core::NamespaceId;
use mesaplane_core::PipelineId;
use mesaplane_core::Run;
use mesaplane_core::RunStatus;
use mesaplane_core::StoreError;
use mesaplane_core::Trigger;
use mesaplane_core::TriggerConfig;
use mesaplane_core::TriggerEvent;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

use crate::engine::RunEngine;
use crate::scheduler;

/// Errors raised while evaluating triggers for an event.
#[derive(Debug, thiserror::Error)]
pub enum TriggerMatchError {
    /// The underlying store read or write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Evaluates triggers against events and submits matching runs.
pub struct TriggerEvaluator<E: Executor> {
    store: Arc<dyn MetadataStore>,
    engine: Arc<RunEngine<E>>,
}

impl<E: Executor> TriggerEvaluator<E> {
    /// Builds a Trigger Evaluator over `store`, submitting fired runs
    /// through `engine`.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>, engine: Arc<RunEngine<E>>) -> Self {
        Self { store, engine }
    }

    /// Matches `event` against every enabled trigger, firing (and
    /// submitting) each one whose configuration matches and whose cooldown
    /// has elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`TriggerMatchError`] when the initial trigger listing fails;
    /// per-trigger failures are logged and do not abort evaluation.
    pub async fn handle_event(&self, event: &TriggerEvent) -> Result<Vec<Run>, TriggerMatchError> {
        let triggers = self.store.list_enabled_triggers().await?;
        let now = OffsetDateTime::now_utc();
        let mut fired = Vec::new();
        for trigger in triggers {
            if !self.matches(&trigger, event, now).await {
                continue;
            }
            if !cooldown_elapsed(&trigger, now) {
                continue;
            }
            if let Some(run) = self.fire(trigger, now).await {
                fired.push(run);
            }
            tokio::task::yield_now().await;
        }
        Ok(fired)
    }

    async fn matches(&self, trigger: &Trigger, event: &TriggerEvent, now: OffsetDateTime) -> bool {
        match (&trigger.config, event) {
            (
                TriggerConfig::Upload { namespace, zone },
                TriggerEvent::Upload { namespace: event_ns, zone: event_zone, .. },
            ) => namespace == event_ns && zone == event_zone,
            (
                TriggerConfig::FilePattern { namespace, zone, glob },
                TriggerEvent::Upload { namespace: event_ns, zone: event_zone, filename },
            ) => namespace == event_ns && zone == event_zone && glob_match(glob, filename),
            (
                TriggerConfig::PipelineSuccess { namespace, layer, pipeline },
                TriggerEvent::RunComplete { namespace: event_ns, layer: event_layer, pipeline_name, status },
            ) => {
                *status == RunStatus::Success
                    && namespace == event_ns
                    && layer == event_layer
                    && pipeline == pipeline_name
            }
            (TriggerConfig::Cron { expr }, TriggerEvent::Tick) => cron_is_due(expr, trigger.last_triggered_at, now),
            (TriggerConfig::CronDependency { expr, dependencies }, TriggerEvent::Tick) => {
                cron_is_due(expr, trigger.last_triggered_at, now)
                    && self.any_dependency_advanced(dependencies, trigger.last_triggered_at).await
            }
            (TriggerConfig::Webhook { token_hash }, TriggerEvent::Webhook { token }) => {
                verify_webhook_token(token, token_hash)
            }
            _ => false,
        }
    }

    async fn any_dependency_advanced(
        &self,
        dependencies: &[PipelineId],
        last_triggered_at: Option<OffsetDateTime>,
    ) -> bool {
        let since = last_triggered_at.unwrap_or(OffsetDateTime::UNIX_EPOCH);
        for dependency in dependencies {
            let Ok(Some(pipeline)) = self.store.get_pipeline(*dependency).await else { continue };
            let Ok(page) = self
                .store
                .list_runs(Some(&pipeline.namespace), Some(RunStatus::Success), ListParams::new(Some(50), None))
                .await
            else {
                continue;
            };
            let advanced = page
                .items
                .iter()
                .any(|run| run.pipeline_id == *dependency && run.finished_at.is_some_and(|at| at > since));
            if advanced {
                return true;
            }
        }
        false
    }

    async fn fire(&self, trigger: Trigger, now: OffsetDateTime) -> Option<Run> {
        let pipeline = self.store.get_pipeline(trigger.pipeline_id).await.ok().flatten()?;
        let tag = format!("trigger:{}:{}", trigger.config.kind_name(), trigger.id.as_uuid());
        let pending = RunEngine::<E>::build_pending_run(&pipeline, tag);
        let advanced = Trigger { last_triggered_at: Some(now), last_run_id: Some(pending.id), ..trigger };

        let run = match self.store.create_run_and_advance_trigger(pending, advanced).await {
            Ok((run, _trigger)) => run,
            Err(err) => {
                tracing::warn!(error = %err, "failed to create run and advance trigger");
                return None;
            }
        };

        match self.engine.dispatch(&pipeline, run).await {
            Ok(dispatched) => Some(dispatched),
            Err(err) => {
                tracing::warn!(error = %err, "triggered dispatch failed");
                None
            }
        }
    }
}

fn cooldown_elapsed(trigger: &Trigger, now: OffsetDateTime) -> bool {
    trigger.last_triggered_at.is_none_or(|last| {
        let elapsed = (now - last).whole_seconds().max(0);
        u64::try_from(elapsed).unwrap_or(u64::MAX) >= trigger.cooldown_seconds
    })
}

fn cron_is_due(expr: &str, last_triggered_at: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
    let Ok(parsed) = scheduler::parse_cron(expr) else { return false };
    let since = last_triggered_at.unwrap_or(OffsetDateTime::UNIX_EPOCH);
    scheduler::next_occurrence_after(&parsed, since) <= now
}

/// Verifies a raw webhook `token` against a stored SHA-256 hex `hash`,
/// comparing in constant time so response latency cannot leak how many
/// leading hex digits matched.
fn verify_webhook_token(token: &str, hash: &str) -> bool {
    let mut digest = Sha256::new();
    digest.update(token.as_bytes());
    let computed = hex_encode(&digest.finalize());
    computed.as_bytes().ct_eq(hash.as_bytes()).into()
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Minimal shell-style glob: `*` matches any run of characters, `?` matches
/// exactly one, everything else is literal. Sufficient for matching
/// uploaded filenames against a trigger-authored pattern; there is no
/// directory-separator special-casing since filenames never contain `/`.
fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    glob_match_from(&pattern, &candidate)
}

fn glob_match_from(pattern: &[char], candidate: &[char]) -> bool {
    match pattern.first() {
        None => candidate.is_empty(),
        Some('*') => {
            glob_match_from(&pattern[1..], candidate)
                || (!candidate.is_empty() && glob_match_from(pattern, &candidate[1..]))
        }
        Some('?') => !candidate.is_empty() && glob_match_from(&pattern[1..], &candidate[1..]),
        Some(literal) => {
            candidate.first() == Some(literal) && glob_match_from(&pattern[1..], &candidate[1..])
        }
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

    use super::*;

    #[test]
    fn glob_match_supports_star_and_question_mark() {
        assert!(glob_match("orders_*.csv", "orders_2026-01-01.csv"));
        assert!(glob_match("part-?.parquet", "part-3.parquet"));
        assert!(!glob_match("part-?.parquet", "part-30.parquet"));
    }

    #[test]
    fn verify_webhook_token_accepts_matching_hash_and_rejects_mismatch() {
        let mut digest = Sha256::new();
        digest.update(b"s3cr3t");
        let hash = hex_encode(&digest.finalize());
        assert!(verify_webhook_token("s3cr3t", &hash));
        assert!(!verify_webhook_token("wrong", &hash));
    }

    #[test]
    fn cooldown_elapsed_when_never_fired() {
        let trigger = Trigger {
            id: mesaplane_core::TriggerId::new(),
            pipeline_id: PipelineId::new(),
            config: TriggerConfig::Upload { namespace: NamespaceId::new("acme").expect("slug"), zone: "raw".to_string() },
            enabled: true,
            cooldown_seconds: 60,
            last_triggered_at: None,
            last_run_id: None,
        };
        assert!(cooldown_elapsed(&trigger, OffsetDateTime::now_utc()));
    }

    #[test]
    fn cooldown_blocks_immediate_refire() {
        let now = OffsetDateTime::now_utc();
        let trigger = Trigger {
            id: mesaplane_core::TriggerId::new(),
            pipeline_id: PipelineId::new(),
            config: TriggerConfig::Upload { namespace: NamespaceId::new("acme").expect("slug"), zone: "raw".to_string() },
            enabled: true,
            cooldown_seconds: 3600,
            last_triggered_at: Some(now),
            last_run_id: None,
        };
        assert!(!cooldown_elapsed(&trigger, now));
    }

    struct NoopExecutor;

    #[async_trait::async_trait]
    impl Executor for NoopExecutor {
        async fn submit(&self, _descriptor: &mesaplane_core::RunDescriptor) -> Result<(), mesaplane_core::ExecutorError> {
            Ok(())
        }

        async fn get_status(&self, _run_id: mesaplane_core::RunId) -> Result<mesaplane_core::ExecutorStatus, mesaplane_core::ExecutorError> {
            Ok(mesaplane_core::ExecutorStatus { status: RunStatus::Running, rows_written: None, error: None })
        }

        async fn stream_logs(
            &self,
            _run_id: mesaplane_core::RunId,
        ) -> Result<Vec<mesaplane_core::LogEntry>, mesaplane_core::ExecutorError> {
            Ok(Vec::new())
        }

        async fn cancel(&self, _run_id: mesaplane_core::RunId) -> Result<(), mesaplane_core::ExecutorError> {
            Ok(())
        }

        fn implementation_label(&self) -> &'static str {
            "noop"
        }
    }

    fn test_pipeline() -> mesaplane_core::Pipeline {
        let now = OffsetDateTime::now_utc();
        mesaplane_core::Pipeline {
            id: PipelineId::new(),
            namespace: NamespaceId::new("acme").expect("slug"),
            layer: mesaplane_core::Layer::Bronze,
            name: "orders".to_string(),
            kind: mesaplane_core::PipelineKind::Sql,
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
    async fn upload_trigger_cooldown_gates_refire_until_elapsed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = Arc::new(
            mesaplane_store_sqlite::SqliteMetadataStore::open(&dir.path().join("trigger-test.sqlite3"), 1)
                .expect("open store"),
        );
        let pipeline = store.create_pipeline(test_pipeline()).await.expect("create pipeline");
        let zone = "raw".to_string();
        let trigger = store
            .create_trigger(Trigger {
                id: mesaplane_core::TriggerId::new(),
                pipeline_id: pipeline.id,
                config: TriggerConfig::Upload { namespace: pipeline.namespace.clone(), zone: zone.clone() },
                enabled: true,
                cooldown_seconds: 60,
                last_triggered_at: None,
                last_run_id: None,
            })
            .await
            .expect("create trigger");

        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let engine = Arc::new(RunEngine::new(
            Arc::clone(&store) as Arc<dyn MetadataStore>,
            Arc::new(NoopExecutor),
            tx,
        ));
        let evaluator = TriggerEvaluator::new(Arc::clone(&store) as Arc<dyn MetadataStore>, engine);

        let upload = TriggerEvent::Upload { namespace: pipeline.namespace.clone(), zone: zone.clone(), filename: "a.csv".to_string() };

        let first = evaluator.handle_event(&upload).await.expect("handle first upload");
        assert_eq!(first.len(), 1);

        let second = evaluator.handle_event(&upload).await.expect("handle second upload");
        assert!(second.is_empty(), "cooldown should suppress an immediate refire");

        let backdated = Trigger { last_triggered_at: Some(OffsetDateTime::now_utc() - time::Duration::seconds(70)), ..trigger };
        store.update_trigger(backdated).await.expect("backdate trigger");

        let third = evaluator.handle_event(&upload).await.expect("handle third upload");
        assert_eq!(third.len(), 1, "cooldown elapsed, trigger should fire again");
    }
}
