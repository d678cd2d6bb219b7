// crates/mesaplane-server/src/routes/landing.rs
// ============================================================================
// Module: Landing Routes
// Description: Zone CRUD, file listing, multipart upload, and a truncated
//              sample preview.
// Purpose: Expose the landing-zone ingest surface: the place external
//          systems drop files that uploads/file_pattern triggers react to.
// Dependencies: axum (multipart), mesaplane-core, mesaplane-engine
// ============================================================================

//! ## Overview
//! The Store only supports create and list for [`mesaplane_core::LandingZone`]
//! rows (no update or delete), matching the quality-test route group's
//! scope. [`upload`] writes the object before recording the row, so a
//! recorded [`mesaplane_core::LandingFile`] always has bytes behind it; it
//! then best-effort notifies [`crate::state::AppState::trigger_evaluator`]
//! of the upload so `upload`/`file_pattern` triggers can fire. A failed
//! notification is logged, never surfaced to the uploader, since the file
//! is already durably recorded.

use axum::Json;
use axum::Router;
use axum::extract::Multipart;
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

const SAMPLE_PREVIEW_BYTES: usize = 4096;

/// Wire shape for [`mesaplane_core::LandingZone`].
#[derive(Debug, Serialize)]
struct LandingZoneBody {
    id: String,
    namespace: String,
    name: String,
    created_at: OffsetDateTime,
}

impl From<mesaplane_core::LandingZone> for LandingZoneBody {
    fn from(zone: mesaplane_core::LandingZone) -> Self {
        Self {
            id: zone.id.as_uuid().to_string(),
            namespace: zone.namespace.as_str().to_string(),
            name: zone.name,
            created_at: zone.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct LandingZonePage {
    items: Vec<LandingZoneBody>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct ZoneListQuery {
    namespace: String,
    #[serde(flatten)]
    page: PageQuery,
}

#[derive(Debug, Deserialize)]
struct CreateZoneRequest {
    namespace: String,
    name: String,
}

/// Wire shape for [`mesaplane_core::LandingFile`].
#[derive(Debug, Serialize)]
struct LandingFileBody {
    id: String,
    zone_id: String,
    filename: String,
    object_uri: String,
    size_bytes: u64,
    uploaded_at: OffsetDateTime,
}

impl From<mesaplane_core::LandingFile> for LandingFileBody {
    fn from(file: mesaplane_core::LandingFile) -> Self {
        Self {
            id: file.id.as_uuid().to_string(),
            zone_id: file.zone_id.as_uuid().to_string(),
            filename: file.filename,
            object_uri: file.object_uri,
            size_bytes: file.size_bytes,
            uploaded_at: file.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct LandingFilePage {
    items: Vec<LandingFileBody>,
    total: u64,
}

#[derive(Debug, Serialize)]
struct SampleBody {
    filename: String,
    size_bytes: u64,
    truncated: bool,
    sample: String,
}

/// Builds the `/api/v1/landing` route group. Mounted under its own
/// body-size-limit layer by [`crate::server::build_router`] since uploads
/// need a larger cap than the rest of the JSON API.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/landing/zones", get(list_zones).post(create_zone))
        .route("/api/v1/landing/zones/{zone_id}/files", get(list_files).post(upload))
        .route("/api/v1/landing/zones/{zone_id}/files/{file_id}/sample", get(sample))
}

async fn list_zones(
    State(state): State<AppState>,
    Query(query): Query<ZoneListQuery>,
) -> Result<Json<LandingZonePage>, ApiError> {
    let namespace = parse_namespace(&query.namespace)?;
    let page = state.store.list_landing_zones(&namespace, query.page.into_params()).await?;
    Ok(Json(LandingZonePage { items: page.items.into_iter().map(Into::into).collect(), total: page.total }))
}

async fn create_zone(
    State(state): State<AppState>,
    request: Result<Json<CreateZoneRequest>, JsonRejection>,
) -> Result<Json<LandingZoneBody>, ApiError> {
    let Json(request) = request?;
    let namespace = parse_namespace(&request.namespace)?;
    let zone = mesaplane_core::LandingZone {
        id: mesaplane_core::LandingZoneId::new(),
        namespace,
        name: request.name,
        created_at: OffsetDateTime::now_utc(),
    };
    let created = state.store.create_landing_zone(zone).await?;
    Ok(Json(created.into()))
}

async fn list_files(
    State(state): State<AppState>,
    Path(zone_id): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<LandingFilePage>, ApiError> {
    let zone_id = parse_uuid_id::<mesaplane_core::LandingZoneId>(&zone_id, "zone_id")?;
    let page = state.store.list_landing_files(zone_id, query.into_params()).await?;
    Ok(Json(LandingFilePage { items: page.items.into_iter().map(Into::into).collect(), total: page.total }))
}

async fn upload(
    State(state): State<AppState>,
    Path(zone_id): Path<String>,
    mut multipart: Multipart,
) -> Result<Json<LandingFileBody>, ApiError> {
    let zone_id = parse_uuid_id::<mesaplane_core::LandingZoneId>(&zone_id, "zone_id")?;
    let zone = find_zone(&state, zone_id).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::validation(format!("invalid multipart body: {err}")))?
        .ok_or_else(|| ApiError::validation("multipart body carried no file field"))?;
    let filename = field.file_name().map(ToOwned::to_owned).ok_or_else(|| ApiError::validation("file field had no filename"))?;
    let bytes = field.bytes().await.map_err(|err| ApiError::validation(format!("failed reading upload body: {err}")))?;

    let object_path = format!("landing/{}/{}/{filename}", zone.namespace.as_str(), zone.name);
    mesaplane_core::validate_object_path(&object_path)?;
    state.object_store.write(&object_path, bytes.to_vec()).await?;

    let file = mesaplane_core::LandingFile {
        id: mesaplane_core::LandingFileId::new(),
        zone_id,
        filename: filename.clone(),
        object_uri: object_path,
        size_bytes: bytes.len() as u64,
        uploaded_at: OffsetDateTime::now_utc(),
    };
    let recorded = state.store.record_landing_file(file).await?;

    let event = mesaplane_core::TriggerEvent::Upload { namespace: zone.namespace, zone: zone.name, filename };
    if let Err(err) = state.trigger_evaluator.handle_event(&event).await {
        tracing::warn!(error = %err, "trigger evaluation after upload failed");
    }

    Ok(Json(recorded.into()))
}

async fn sample(
    State(state): State<AppState>,
    Path((zone_id, file_id)): Path<(String, String)>,
) -> Result<Json<SampleBody>, ApiError> {
    let zone_id = parse_uuid_id::<mesaplane_core::LandingZoneId>(&zone_id, "zone_id")?;
    let file_id = parse_uuid_id::<mesaplane_core::LandingFileId>(&file_id, "file_id")?;
    let page = state.store.list_landing_files(zone_id, mesaplane_core::ListParams::new(Some(500), None)).await?;
    let file = page.items.into_iter().find(|file| file.id == file_id).ok_or_else(|| ApiError::not_found("landing file not found"))?;

    let bytes = state.object_store.read(&file.object_uri).await?;
    let truncated = bytes.len() > SAMPLE_PREVIEW_BYTES;
    let sample = String::from_utf8_lossy(&bytes[..bytes.len().min(SAMPLE_PREVIEW_BYTES)]).into_owned();
    Ok(Json(SampleBody { filename: file.filename, size_bytes: file.size_bytes, truncated, sample }))
}

/// Zones are only listed per-namespace by the Store, and there is no
/// `get_landing_zone`, so resolving a bare zone id scans every namespace's
/// zones. Acceptable for this build's scale; a dedicated lookup is the
/// obvious follow-up once the Store grows one.
async fn find_zone(state: &AppState, zone_id: mesaplane_core::LandingZoneId) -> Result<mesaplane_core::LandingZone, ApiError> {
    let namespaces = state.store.list_namespaces(mesaplane_core::ListParams::new(Some(500), None)).await?;
    for namespace in namespaces.items {
        let zones = state.store.list_landing_zones(&namespace.id, mesaplane_core::ListParams::new(Some(500), None)).await?;
        if let Some(zone) = zones.items.into_iter().find(|zone| zone.id == zone_id) {
            return Ok(zone);
        }
    }
    Err(ApiError::not_found("landing zone not found"))
}
