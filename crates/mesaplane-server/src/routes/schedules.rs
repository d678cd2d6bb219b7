// crates/mesaplane-server/src/routes/schedules.rs
// ============================================================================
// Module: Schedule Routes
// Description: CRUD for cron schedules nested under a pipeline.
// Purpose: Expose `MetadataStore`'s schedule operations over REST.
// Dependencies: axum, mesaplane-core, mesaplane-engine
// ============================================================================

//! ## Overview
//! The Store has no `get_schedule`; [`get_one`] falls back to listing the
//! owning pipeline's schedules (capped at the page limit) and filtering by
//! id, which is exact for any namespace that keeps a pipeline's schedule
//! count under a single page. `cron_expr` is validated at creation time
//! against the same parser the Scheduler uses, so a malformed expression is
//! rejected here rather than silently never firing.

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::get;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;

use crate::error::ApiError;
use crate::routes::PageQuery;
use crate::routes::parse_uuid_id;
use crate::state::AppState;

/// Wire shape for [`mesaplane_core::Schedule`].
#[derive(Debug, Serialize)]
struct ScheduleBody {
    id: String,
    pipeline_id: String,
    cron_expr: String,
    enabled: bool,
    last_run_id: Option<String>,
    last_run_at: Option<OffsetDateTime>,
    next_run_at: Option<OffsetDateTime>,
}

impl From<mesaplane_core::Schedule> for ScheduleBody {
    fn from(schedule: mesaplane_core::Schedule) -> Self {
        Self {
            id: schedule.id.as_uuid().to_string(),
            pipeline_id: schedule.pipeline_id.as_uuid().to_string(),
            cron_expr: schedule.cron_expr,
            enabled: schedule.enabled,
            last_run_id: schedule.last_run_id.map(|id| id.as_uuid().to_string()),
            last_run_at: schedule.last_run_at,
            next_run_at: schedule.next_run_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct SchedulePage {
    items: Vec<ScheduleBody>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct CreateScheduleRequest {
    cron_expr: String,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Deserialize, Default)]
struct UpdateScheduleRequest {
    cron_expr: Option<String>,
    enabled: Option<bool>,
}

/// Builds the `/api/v1/pipelines/{pipeline_id}/schedules` route group.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/pipelines/{pipeline_id}/schedules", get(list).post(create))
        .route(
            "/api/v1/pipelines/{pipeline_id}/schedules/{schedule_id}",
            get(get_one).patch(update).delete(delete_one),
        )
}

async fn list(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<SchedulePage>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let page = state.store.list_schedules(id, query.into_params()).await?;
    Ok(Json(SchedulePage { items: page.items.into_iter().map(Into::into).collect(), total: page.total }))
}

async fn get_one(
    State(state): State<AppState>,
    Path((pipeline_id, schedule_id)): Path<(String, String)>,
) -> Result<Json<ScheduleBody>, ApiError> {
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let schedule_id = parse_uuid_id::<mesaplane_core::ScheduleId>(&schedule_id, "schedule_id")?;
    let schedule = find_schedule(&state, pipeline_id, schedule_id).await?;
    Ok(Json(schedule.into()))
}

async fn create(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    request: Result<Json<CreateScheduleRequest>, JsonRejection>,
) -> Result<Json<ScheduleBody>, ApiError> {
    let Json(request) = request?;
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    state.store.get_pipeline(pipeline_id).await?.ok_or_else(|| ApiError::not_found("pipeline not found"))?;
    validate_cron(&request.cron_expr)?;
    let schedule = mesaplane_core::Schedule {
        id: mesaplane_core::ScheduleId::new(),
        pipeline_id,
        cron_expr: request.cron_expr,
        enabled: request.enabled,
        last_run_id: None,
        last_run_at: None,
        next_run_at: None,
    };
    let created = state.store.create_schedule(schedule).await?;
    Ok(Json(created.into()))
}

async fn update(
    State(state): State<AppState>,
    Path((pipeline_id, schedule_id)): Path<(String, String)>,
    request: Result<Json<UpdateScheduleRequest>, JsonRejection>,
) -> Result<Json<ScheduleBody>, ApiError> {
    let Json(request) = request?;
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let schedule_id = parse_uuid_id::<mesaplane_core::ScheduleId>(&schedule_id, "schedule_id")?;
    let existing = find_schedule(&state, pipeline_id, schedule_id).await?;
    if let Some(cron_expr) = &request.cron_expr {
        validate_cron(cron_expr)?;
    }
    let updated = mesaplane_core::Schedule {
        cron_expr: request.cron_expr.unwrap_or(existing.cron_expr),
        enabled: request.enabled.unwrap_or(existing.enabled),
        ..existing
    };
    let saved = state.store.update_schedule(updated).await?;
    Ok(Json(saved.into()))
}

async fn delete_one(
    State(state): State<AppState>,
    Path((pipeline_id, schedule_id)): Path<(String, String)>,
) -> Result<(), ApiError> {
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let schedule_id = parse_uuid_id::<mesaplane_core::ScheduleId>(&schedule_id, "schedule_id")?;
    find_schedule(&state, pipeline_id, schedule_id).await?;
    state.store.delete_schedule(schedule_id).await?;
    Ok(())
}

async fn find_schedule(
    state: &AppState,
    pipeline_id: mesaplane_core::PipelineId,
    schedule_id: mesaplane_core::ScheduleId,
) -> Result<mesaplane_core::Schedule, ApiError> {
    let page = state.store.list_schedules(pipeline_id, mesaplane_core::ListParams::new(Some(500), None)).await?;
    page.items
        .into_iter()
        .find(|schedule| schedule.id == schedule_id)
        .ok_or_else(|| ApiError::not_found("schedule not found"))
}

fn validate_cron(expr: &str) -> Result<(), ApiError> {
    mesaplane_engine::scheduler::parse_cron(expr)
        .map(|_| ())
        .map_err(|err| ApiError::validation(format!("invalid cron expression: {err}")))
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
    fn validate_cron_accepts_five_field_expression() {
        assert!(validate_cron("0 */5 * * *").is_ok());
    }

    #[test]
    fn validate_cron_rejects_garbage() {
        assert!(validate_cron("not a cron expression").is_err());
    }
}
