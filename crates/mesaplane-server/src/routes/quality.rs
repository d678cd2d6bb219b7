// crates/mesaplane-server/src/routes/quality.rs
// ============================================================================
// Module: Quality Routes
// Description: Authoring data-quality tests nested under a pipeline, and
//              reading their most recent results.
// Purpose: Expose `MetadataStore`'s quality operations over REST.
// Dependencies: axum, mesaplane-core
// ============================================================================

//! ## Overview
//! The Store only supports create and list for [`mesaplane_core::QualityTest`]
//! rows (no update or delete); a test authored with the wrong expression is
//! retired by creating a replacement and ignoring the old one, rather than
//! this crate inventing persistence the Store does not have. Results are
//! write-once: a worker calls [`record_result`], and [`latest_results`]
//! returns the newest row per test.

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

/// Wire shape for [`mesaplane_core::QualityTest`].
#[derive(Debug, Serialize)]
struct QualityTestBody {
    id: String,
    pipeline_id: String,
    name: String,
    expression: String,
}

impl From<mesaplane_core::QualityTest> for QualityTestBody {
    fn from(test: mesaplane_core::QualityTest) -> Self {
        Self { id: test.id.as_uuid().to_string(), pipeline_id: test.pipeline_id.as_uuid().to_string(), name: test.name, expression: test.expression }
    }
}

#[derive(Debug, Serialize)]
struct QualityTestPage {
    items: Vec<QualityTestBody>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct CreateQualityTestRequest {
    name: String,
    expression: String,
}

/// Wire shape for [`mesaplane_core::QualityResult`].
#[derive(Debug, Serialize)]
struct QualityResultBody {
    id: String,
    test_id: String,
    run_id: String,
    passed: bool,
    detail: Option<String>,
    recorded_at: OffsetDateTime,
}

impl From<mesaplane_core::QualityResult> for QualityResultBody {
    fn from(result: mesaplane_core::QualityResult) -> Self {
        Self {
            id: result.id.as_uuid().to_string(),
            test_id: result.test_id.as_uuid().to_string(),
            run_id: result.run_id.as_uuid().to_string(),
            passed: result.passed,
            detail: result.detail,
            recorded_at: result.recorded_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RecordQualityResultRequest {
    test_id: String,
    run_id: String,
    passed: bool,
    detail: Option<String>,
}

/// Builds the quality route group, nested under a pipeline.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/pipelines/{pipeline_id}/quality/tests", get(list_tests).post(create_test))
        .route("/api/v1/pipelines/{pipeline_id}/quality/results", post(record_result))
        .route("/api/v1/pipelines/{pipeline_id}/quality/results/latest", get(latest_results))
}

async fn list_tests(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<QualityTestPage>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let page = state.store.list_quality_tests(id, query.into_params()).await?;
    Ok(Json(QualityTestPage { items: page.items.into_iter().map(Into::into).collect(), total: page.total }))
}

async fn create_test(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    request: Result<Json<CreateQualityTestRequest>, JsonRejection>,
) -> Result<Json<QualityTestBody>, ApiError> {
    let Json(request) = request?;
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    state.store.get_pipeline(pipeline_id).await?.ok_or_else(|| ApiError::not_found("pipeline not found"))?;
    let test = mesaplane_core::QualityTest {
        id: mesaplane_core::QualityTestId::new(),
        pipeline_id,
        name: request.name,
        expression: request.expression,
    };
    let created = state.store.create_quality_test(test).await?;
    Ok(Json(created.into()))
}

async fn record_result(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
    request: Result<Json<RecordQualityResultRequest>, JsonRejection>,
) -> Result<Json<QualityResultBody>, ApiError> {
    let Json(request) = request?;
    let _pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let test_id = parse_uuid_id::<mesaplane_core::QualityTestId>(&request.test_id, "test_id")?;
    let run_id = parse_uuid_id::<mesaplane_core::RunId>(&request.run_id, "run_id")?;
    let result = mesaplane_core::QualityResult {
        id: mesaplane_core::QualityResultId::new(),
        test_id,
        run_id,
        passed: request.passed,
        detail: request.detail,
        recorded_at: OffsetDateTime::now_utc(),
    };
    let recorded = state.store.record_quality_result(result).await?;
    Ok(Json(recorded.into()))
}

async fn latest_results(
    State(state): State<AppState>,
    Path(pipeline_id): Path<String>,
) -> Result<Json<Vec<QualityResultBody>>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::PipelineId>(&pipeline_id, "pipeline_id")?;
    let results = state.store.latest_quality_results(id).await?;
    Ok(Json(results.into_iter().map(Into::into).collect()))
}
