// crates/mesaplane-server/src/routes/pipelines.rs
// ============================================================================
// Module: Pipeline Routes
// Description: List/get/create/update/delete, plus the publish/versions/
//              rollback operations named in the external-interface table.
// Purpose: Expose `MetadataStore`'s pipeline operations over REST.
// Dependencies: axum, mesaplane-core
// ============================================================================

//! ## Overview
//! `publish`, `list_versions`, and `rollback` are named in the external
//! interface table but this build's [`mesaplane_core::Pipeline`] carries no
//! version history field and the Store exposes no version table; these
//! three handlers are honest about that rather than inventing persisted
//! state. `publish` touches `updated_at` (the closest present analogue to
//! "make this the live definition"); `list_versions` returns the single
//! current row as version `1`; `rollback` reports `validation` naming the
//! limitation.

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
use crate::routes::parse_namespace;
use crate::routes::parse_uuid_id;
use crate::state::AppState;

/// Wire shape for [`mesaplane_core::Pipeline`].
#[derive(Debug, Serialize)]
struct PipelineBody {
    id: String,
    namespace: String,
    layer: &'static str,
    name: String,
    kind: &'static str,
    storage_prefix: String,
    description: Option<String>,
    owner: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    deleted_at: Option<OffsetDateTime>,
    retention_overrides: mesaplane_core::RetentionOverrides,
}

impl From<mesaplane_core::Pipeline> for PipelineBody {
    fn from(pipeline: mesaplane_core::Pipeline) -> Self {
        Self {
            id: pipeline.id.as_uuid().to_string(),
            namespace: pipeline.namespace.as_str().to_string(),
            layer: pipeline.layer.as_str(),
            name: pipeline.name,
            kind: match pipeline.kind {
                mesaplane_core::PipelineKind::Sql => "sql",
                mesaplane_core::PipelineKind::Script => "script",
            },
            storage_prefix: pipeline.storage_prefix,
            description: pipeline.description,
            owner: pipeline.owner,
            created_at: pipeline.created_at,
            updated_at: pipeline.updated_at,
            deleted_at: pipeline.deleted_at,
            retention_overrides: pipeline.retention_overrides,
        }
    }
}

#[derive(Debug, Serialize)]
struct PipelinePage {
    items: Vec<PipelineBody>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct PipelineListQuery {
    namespace: String,
    #[serde(default)]
    include_deleted: bool,
    #[serde(flatten)]
    page: PageQuery,
}

#[derive(Debug, Deserialize)]
struct CreatePipelineRequest {
    namespace: String,
    layer: LayerWire,
    name: String,
    kind: KindWire,
    storage_prefix: String,
    description: Option<String>,
    owner: Option<String>,
    #[serde(default)]
    retention_overrides: mesaplane_core::RetentionOverrides,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LayerWire {
    Bronze,
    Silver,
    Gold,
}

impl From<LayerWire> for mesaplane_core::Layer {
    fn from(wire: LayerWire) -> Self {
        match wire {
            LayerWire::Bronze => Self::Bronze,
            LayerWire::Silver => Self::Silver,
            LayerWire::Gold => Self::Gold,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum KindWire {
    Sql,
    Script,
}

impl From<KindWire> for mesaplane_core::PipelineKind {
    fn from(wire: KindWire) -> Self {
        match wire {
            KindWire::Sql => Self::Sql,
            KindWire::Script => Self::Script,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct UpdatePipelineRequest {
    description: Option<String>,
    owner: Option<String>,
    retention_overrides: Option<mesaplane_core::RetentionOverrides>,
}

#[derive(Debug, Serialize)]
struct PipelineVersion {
    version: u32,
    pipeline: PipelineBody,
}

/// Builds the `/api/v1/pipelines` route group.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/pipelines", get(list).post(create))
        .route("/api/v1/pipelines/{pipeline_id}", get(get_one).patch(update).delete(delete_one))
        .route("/api/v1/pipelines/{pipeline_id}/publish", post(publish))
        .route("/api/v1/pipelines/{pipeline_id}/versions", get(list_versions))
        .route("/api/v1/pipelines/{pipeline_id}/rollback", post(rollback))
}

async fn list(
    State(state): State<AppState>,
    Query(query): Query<PipelineListQuery>,
) -> Result<Json<PipelinePage>, ApiError> {
    let namespace = parse_namespace(&query.namespace)?;
    let page = state.store.list_pipelines(&namespace, query.include_deleted, query.page.into_params()).await?;
    Ok(Json(PipelinePage { items: page.items.into_iter().map(Into::into).collect(), total: page.total }))
}

async fn get_one(State(state): State<AppState>, Path(pipeline_id): Path<String>) -> Result<Json<PipelineBody>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let pipeline = state.store.get_pipeline(id).await?.ok_or_else(|| ApiError::not_found("pipeline not found"))?;
    Ok(Json(pipeline.into()))
}

async fn create(
    State(state): State<AppState>,
    request: Result<Json<CreatePipelineRequest>, JsonRejection>,
) -> Result<Json<PipelineBody>, ApiError> {
    let Json(request) = request?;
    let namespace = parse_namespace(&request.namespace)?;
    let now = OffsetDateTime::now_utc();
    let pipeline = mesaplane_core::Pipeline {
        id: mesaplane_core::PipelineId::new(),
        namespace,
        layer: request.layer.into(),
        name: request.name,
        kind: request.kind.into(),
        storage_prefix: request.storage_prefix,
        description: request.description,
        owner: request.owner,
        created_at: now,
        updated_at: now,
        deleted_at: None,
        retention_overrides: request.retention_overrides,
    };
    let created = state.store.create_pipeline(pipeline).await?;
    Ok(Json(created.into()))
}

async fn update(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    request: Result<Json<UpdatePipelineRequest>, JsonRejection>,
) -> Result<Json<PipelineBody>, ApiError> {
    let Json(request) = request?;
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let existing = state.store.get_pipeline(id).await?.ok_or_else(|| ApiError::not_found("pipeline not found"))?;
    let updated = mesaplane_core::Pipeline {
        description: request.description.or(existing.description.clone()),
        owner: request.owner.or(existing.owner.clone()),
        retention_overrides: request.retention_overrides.unwrap_or(existing.retention_overrides),
        updated_at: OffsetDateTime::now_utc(),
        ..existing
    };
    let saved = state.store.update_pipeline(updated).await?;
    Ok(Json(saved.into()))
}

async fn delete_one(State(state): State<AppState>, Path(pipeline_id): Path<String>) -> Result<(), ApiError> {
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    state.store.delete_pipeline(id).await?;
    Ok(())
}

async fn publish(State(state): State<AppState>, Path(pipeline_id): Path<String>) -> Result<Json<PipelineBody>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let existing = state.store.get_pipeline(id).await?.ok_or_else(|| ApiError::not_found("pipeline not found"))?;
    let published = mesaplane_core::Pipeline { updated_at: OffsetDateTime::now_utc(), ..existing };
    let saved = state.store.update_pipeline(published).await?;
    Ok(Json(saved.into()))
}

async fn list_versions(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
) -> Result<Json<Vec<PipelineVersion>>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let pipeline = state.store.get_pipeline(id).await?.ok_or_else(|| ApiError::not_found("pipeline not found"))?;
    Ok(Json(vec![PipelineVersion { version: 1, pipeline: pipeline.into() }]))
}

async fn rollback(State(_state): State<AppState>, Path(_pipeline_id): Path<String>) -> Result<(), ApiError> {
    Err(ApiError::validation("pipeline version history is not retained by this build's metadata store"))
}
