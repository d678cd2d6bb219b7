// crates/mesaplane-server/src/routes/namespaces.rs
// ============================================================================
// Module: Namespace Routes
// Description: List/create/delete for the top-level tenancy unit.
// Purpose: Expose `MetadataStore`'s namespace operations over REST.
// Dependencies: axum, mesaplane-core
// ============================================================================

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
use crate::routes::parse_namespace;
use crate::state::AppState;

/// Wire shape for [`mesaplane_core::Namespace`].
#[derive(Debug, Serialize)]
struct NamespaceBody {
    id: String,
    created_at: OffsetDateTime,
}

impl From<mesaplane_core::Namespace> for NamespaceBody {
    fn from(namespace: mesaplane_core::Namespace) -> Self {
        Self { id: namespace.id.as_str().to_string(), created_at: namespace.created_at }
    }
}

#[derive(Debug, Serialize)]
struct NamespacePage {
    items: Vec<NamespaceBody>,
    total: u64,
}

#[derive(Debug, Deserialize)]
struct CreateNamespaceRequest {
    id: String,
}

/// Builds the `/api/v1/namespaces` route group.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/namespaces", get(list).post(create))
        .route("/api/v1/namespaces/{namespace}", axum::routing::delete(delete_namespace))
}

async fn list(State(state): State<AppState>, Query(query): Query<PageQuery>) -> Result<Json<NamespacePage>, ApiError> {
    let page = state.store.list_namespaces(query.into_params()).await?;
    Ok(Json(NamespacePage { items: page.items.into_iter().map(Into::into).collect(), total: page.total }))
}

async fn create(
    State(state): State<AppState>,
    request: Result<Json<CreateNamespaceRequest>, JsonRejection>,
) -> Result<Json<NamespaceBody>, ApiError> {
    let Json(request) = request?;
    let id = parse_namespace(&request.id)?;
    let namespace = state.store.ensure_namespace(&id).await?;
    Ok(Json(namespace.into()))
}

async fn delete_namespace(State(state): State<AppState>, Path(namespace): Path<String>) -> Result<(), ApiError> {
    let id = parse_namespace(&namespace)?;
    state.store.delete_namespace(&id).await?;
    Ok(())
}
