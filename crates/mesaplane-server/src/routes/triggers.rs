// crates/mesaplane-server/src/routes/triggers.rs
// ============================================================================
// Module: Trigger Routes
// Description: CRUD for event bindings nested under a pipeline, plus the
//              authenticated webhook-receive endpoint.
// Purpose: Expose `MetadataStore`'s trigger operations over REST, and give
//          external systems a single POST target that fans out into the
//          Trigger Evaluator.
// Dependencies: axum, mesaplane-core, mesaplane-engine
// ============================================================================

//! ## Overview
//! Like schedules, the Store has no `get_trigger`; [`get_one`] lists the
//! owning pipeline's triggers and filters by id. [`receive_webhook`] never
//! echoes the raw token back and accepts it exactly as posted: matching
//! against the stored hash happens inside
//! [`mesaplane_engine::TriggerEvaluator::handle_event`], in constant time.

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::ApiError;
use crate::routes::PageQuery;
use crate::routes::parse_uuid_id;
use crate::state::AppState;

/// Wire shape for [`mesaplane_core::Trigger`].
#[derive(Debug, Serialize)]
struct TriggerBody {
    id: String,
    pipeline_id: String,
    config: mesaplane_core::TriggerConfig,
    enabled: bool,
    cooldown_seconds: u64,
    last_triggered_at: Option<OffsetDateTime>,
    last_run_id: Option<String>,
}

impl From<mesaplane_core::Trigger> for TriggerBody {
    fn from(trigger: mesaplane_core::Trigger) -> Self {
        Self {
            id: trigger.id.as_uuid().to_string(),
            pipeline_id: trigger.pipeline_id.as_uuid().to_string(),
            config: trigger.config,
            enabled: trigger.enabled,
            cooldown_seconds: trigger.cooldown_seconds,
            last_triggered_at: trigger.last_triggered_at,
            last_run_id: trigger.last_run_id.map(|id| id.as_uuid().to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct TriggerPage {
    items: Vec<TriggerBody>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct CreateTriggerRequest {
    config: mesaplane_core::TriggerConfig,
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    cooldown_seconds: u64,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
struct UpdateTriggerRequest {
    config: Option<mesaplane_core::TriggerConfig>,
    enabled: Option<bool>,
    cooldown_seconds: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WebhookRequest {
    token: String,
}

#[derive(Debug, Serialize)]
struct WebhookResponse {
    fired: usize,
}

/// Builds the trigger route group: CRUD nested under a pipeline, plus the
/// standalone webhook-receive endpoint.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/pipelines/{pipeline_id}/triggers", get(list).post(create))
        .route(
            "/api/v1/pipelines/{pipeline_id}/triggers/{trigger_id}",
            get(get_one).patch(update).delete(delete_one),
        )
        .route("/api/v1/webhooks", post(receive_webhook))
}

async fn list(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<TriggerPage>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let page = state.store.list_triggers(id, query.into_params()).await?;
    Ok(Json(TriggerPage { items: page.items.into_iter().map(Into::into).collect(), total: page.total }))
}

async fn get_one(
    State(state): State<AppState>,
    Path((pipeline_id, trigger_id)): Path<(String, String)>,
) -> Result<Json<TriggerBody>, ApiError> {
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let trigger_id = parse_uuid_id::<mesaplane_core::TriggerId>(&trigger_id, "trigger_id")?;
    let trigger = find_trigger(&state, pipeline_id, trigger_id).await?;
    Ok(Json(trigger.into()))
}

async fn create(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    request: Result<Json<CreateTriggerRequest>, JsonRejection>,
) -> Result<Json<TriggerBody>, ApiError> {
    let Json(request) = request?;
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    state.store.get_pipeline(pipeline_id).await?.ok_or_else(|| ApiError::not_found("pipeline not found"))?;
    let trigger = mesaplane_core::Trigger {
        id: mesaplane_core::TriggerId::new(),
        pipeline_id,
        config: request.config,
        enabled: request.enabled,
        cooldown_seconds: request.cooldown_seconds,
        last_triggered_at: None,
        last_run_id: None,
    };
    let created = state.store.create_trigger(trigger).await?;
    Ok(Json(created.into()))
}

async fn update(
    State(state): State<AppState>,
    Path((pipeline_id, trigger_id)): Path<(String, String)>,
    request: Result<Json<UpdateTriggerRequest>, JsonRejection>,
) -> Result<Json<TriggerBody>, ApiError> {
    let Json(request) = request?;
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let trigger_id = parse_uuid_id::<mesaplane_core::TriggerId>(&trigger_id, "trigger_id")?;
    let existing = find_trigger(&state, pipeline_id, trigger_id).await?;
    let updated = mesaplane_core::Trigger {
        config: request.config.unwrap_or(existing.config.clone()),
        enabled: request.enabled.unwrap_or(existing.enabled),
        cooldown_seconds: request.cooldown_seconds.unwrap_or(existing.cooldown_seconds),
        ..existing
    };
    let saved = state.store.update_trigger(updated).await?;
    Ok(Json(saved.into()))
}

async fn delete_one(
    State(state): State<AppState>,
    Path((pipeline_id, trigger_id)): Path<(String, String)>,
) -> Result<(), ApiError> {
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let trigger_id = parse_uuid_id::<mesaplane_core::TriggerId>(&trigger_id, "trigger_id")?;
    find_trigger(&state, pipeline_id, trigger_id).await?;
    state.store.delete_trigger(trigger_id).await?;
    Ok(())
}

async fn receive_webhook(
    State(state): State<AppState>,
    request: Result<Json<WebhookRequest>, JsonRejection>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let Json(request) = request?;
    let fired = state.trigger_evaluator.handle_event(&mesaplane_core::TriggerEvent::Webhook { token: request.token }).await?;
    Ok(Json(WebhookResponse { fired: fired.len() }))
}

async fn find_trigger(
    state: &AppState,
    pipeline_id: mesaplane_core::PipelineId,
    trigger_id: mesaplane_core::TriggerId,
) -> Result<mesaplane_core::Trigger, ApiError> {
    let page = state.store.list_triggers(pipeline_id, mesaplane_core::ListParams::new(Some(500), None)).await?;
    page.items
        .into_iter()
        .find(|trigger| trigger.id == trigger_id)
        .ok_or_else(|| ApiError::not_found("trigger not found"))
}
