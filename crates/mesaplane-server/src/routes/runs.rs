// crates/mesaplane-server/src/routes/runs.rs
// ============================================================================
// Module: Run Routes
// Description: List (filterable)/get/submit/cancel, plus the SSE live-log
//              stream.
// Purpose: Expose the Run Engine and the Store's run operations over REST.
// Dependencies: axum, mesaplane-core, mesaplane-engine, tokio-stream
// ============================================================================

//! ## Overview
//! [`stream_logs`] opens a one-way SSE stream per the Request Layer
//! contract: headers flush immediately (axum's `Sse` response does this by
//! construction), a heartbeat comment goes out at `config.sse_heartbeat`,
//! the stream force-closes after `config.sse_max_lifetime` with an explicit
//! `end` event, and it closes as soon as the run reaches a terminal state.
//! [`AppState::open_streams`] is incremented for the stream's lifetime so
//! the feature probe reflects current SSE load.

use std::convert::Infallible;
use std::sync::atomic::Ordering;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::IntoResponse;
use axum::response::Sse;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::routing::get;
use axum::routing::post;
use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ApiError;
use crate::routes::PageQuery;
use crate::routes::parse_namespace;
use crate::routes::parse_uuid_id;
use crate::server::ServerConfig;
use crate::state::AppState;

/// Wire shape for [`mesaplane_core::Run`].
#[derive(Debug, Serialize)]
struct RunBody {
    id: String,
    pipeline_id: String,
    status: &'static str,
    trigger: String,
    started_at: Option<OffsetDateTime>,
    finished_at: Option<OffsetDateTime>,
    duration_ms: Option<i64>,
    rows_written: Option<i64>,
    error: Option<String>,
    logs_uri: Option<String>,
    created_at: OffsetDateTime,
}

impl From<mesaplane_core::Run> for RunBody {
    fn from(run: mesaplane_core::Run) -> Self {
        Self {
            id: run.id.as_uuid().to_string(),
            pipeline_id: run.pipeline_id.as_uuid().to_string(),
            status: run.status.as_str(),
            trigger: run.trigger,
            started_at: run.started_at,
            finished_at: run.finished_at,
            duration_ms: run.duration_ms,
            rows_written: run.rows_written,
            error: run.error,
            logs_uri: run.logs_uri,
            created_at: run.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunPage {
    items: Vec<RunBody>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct RunListQuery {
    namespace: Option<String>,
    status: Option<StatusWire>,
    #[serde(flatten)]
    page: PageQuery,
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum StatusWire {
    Pending,
    Running,
    Success,
    Failed,
    Cancelled,
}

impl From<StatusWire> for mesaplane_core::RunStatus {
    fn from(wire: StatusWire) -> Self {
        match wire {
            StatusWire::Pending => Self::Pending,
            StatusWire::Running => Self::Running,
            StatusWire::Success => Self::Success,
            StatusWire::Failed => Self::Failed,
            StatusWire::Cancelled => Self::Cancelled,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SubmitRunRequest {
    pipeline_id: String,
    #[serde(default = "default_trigger")]
    trigger: String,
}

fn default_trigger() -> String {
    "manual".to_string()
}

#[derive(Debug, Deserialize)]
struct LogStreamQuery {
    #[serde(default)]
    follow: bool,
}

/// Builds the `/api/v1/runs` route group. `config` supplies the SSE
/// heartbeat and max-lifetime tunables the stream handler needs.
#[must_use]
pub fn router(config: ServerConfig) -> Router<AppState> {
    Router::new()
        .route("/api/v1/runs", get(list).post(submit))
        .route("/api/v1/runs/{run_id}", get(get_one))
        .route("/api/v1/runs/{run_id}/cancel", post(cancel))
        .route(
            "/api/v1/runs/{run_id}/logs",
            get(move |state, path, query| stream_logs(state, path, query, config)),
        )
}

async fn list(State(state): State<AppState>, Query(query): Query<RunListQuery>) -> Result<Json<RunPage>, ApiError> {
    let namespace = query.namespace.map(|raw| parse_namespace(&raw)).transpose()?;
    let status = query.status.map(Into::into);
    let page = state.store.list_runs(namespace.as_ref(), status, query.page.into_params()).await?;
    Ok(Json(RunPage { items: page.items.into_iter().map(Into::into).collect(), total: page.total }))
}

async fn get_one(State(state): State<AppState>, Path(run_id): Path<String>) -> Result<Json<RunBody>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::RunId>(&run_id, "run_id")?;
    let run = state.store.get_run(id).await?.ok_or_else(|| ApiError::not_found("run not found"))?;
    Ok(Json(run.into()))
}

async fn submit(
    State(state): State<AppState>,
    request: Result<Json<SubmitRunRequest>, JsonRejection>,
) -> Result<Json<RunBody>, ApiError> {
    let Json(request) = request?;
    let pipeline_id = parse_uuid_id::<mesaplane_core::PipelineId>(&request.pipeline_id, "pipeline_id")?;
    let pipeline =
        state.store.get_pipeline(pipeline_id).await?.ok_or_else(|| ApiError::not_found("pipeline not found"))?;
    let run = state.engine.submit(&pipeline, request.trigger).await?;
    Ok(Json(run.into()))
}

async fn cancel(State(state): State<AppState>, Path(run_id): Path<String>) -> Result<Json<RunBody>, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::RunId>(&run_id, "run_id")?;
    let run = state.engine.cancel(id).await?;
    Ok(Json(run.into()))
}

async fn stream_logs(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
    Query(query): Query<LogStreamQuery>,
    config: ServerConfig,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_uuid_id::<mesaplane_core::RunId>(&run_id, "run_id")?;
    state.store.get_run(id).await?.ok_or_else(|| ApiError::not_found("run not found"))?;

    let (tx, rx) = tokio::sync::mpsc::channel::<Result<Event, Infallible>>(32);
    state.open_streams.fetch_add(1, Ordering::Relaxed);
    let follow = query.follow;
    tokio::spawn(async move {
        run_log_stream(state.clone(), id, tx, follow, config).await;
        state.open_streams.fetch_sub(1, Ordering::Relaxed);
    });

    Ok(Sse::new(ReceiverStream::new(rx)).keep_alive(KeepAlive::new().interval(config.sse_heartbeat)))
}

async fn run_log_stream(
    state: AppState,
    run_id: mesaplane_core::RunId,
    tx: tokio::sync::mpsc::Sender<Result<Event, Infallible>>,
    follow: bool,
    config: ServerConfig,
) {
    let start = Instant::now();
    let mut sent = 0usize;
    loop {
        if start.elapsed() >= config.sse_max_lifetime {
            let _ignored = tx.send(Ok(Event::default().event("end").data("max stream lifetime reached"))).await;
            return;
        }

        match state.executor.stream_logs(run_id).await {
            Ok(entries) => {
                for entry in entries.iter().skip(sent) {
                    let line = format!("{} {}", entry.timestamp, entry.line);
                    if tx.send(Ok(Event::default().event("log").data(line))).await.is_err() {
                        return;
                    }
                }
                sent = entries.len();
            }
            Err(err) => {
                tracing::debug!(error = %err, "log stream poll failed");
            }
        }

        let terminal = matches!(state.store.get_run(run_id).await, Ok(Some(run)) if run.status.is_terminal());
        if terminal || !follow {
            let _ignored = tx.send(Ok(Event::default().event("end").data("run reached a terminal state"))).await;
            return;
        }

        tokio::time::sleep(config.sse_heartbeat).await;
    }
}
