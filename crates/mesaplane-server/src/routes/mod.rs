// crates/mesaplane-server/src/routes/mod.rs
// ============================================================================
// Module: Request Layer Routes
// Description: One submodule per REST surface group, each exposing a
//              `router()` building its slice of `/api/v1`.
// Purpose: Keep the per-entity handler logic organized the way the
//          teacher organizes its own concern files, one file per domain.
// Dependencies: axum
// ============================================================================

pub mod files;
pub mod health;
pub mod landing;
pub mod namespaces;
pub mod pipelines;
pub mod quality;
pub mod runs;
pub mod schedules;
pub mod triggers;

/// Shared list-query parameters accepted by every paginated endpoint.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct PageQuery {
    /// Maximum rows to return.
    pub limit: Option<u32>,
    /// Rows to skip before collecting `limit`.
    pub offset: Option<u32>,
}

impl PageQuery {
    /// Converts the query into a [`mesaplane_core::ListParams`].
    #[must_use]
    pub fn into_params(self) -> mesaplane_core::ListParams {
        mesaplane_core::ListParams::new(self.limit, self.offset)
    }
}

/// Parses a [`mesaplane_core::NamespaceId`] from a path segment, mapping a
/// malformed slug to a `validation` error rather than a panic.
pub fn parse_namespace(raw: &str) -> Result<mesaplane_core::NamespaceId, crate::error::ApiError> {
    mesaplane_core::NamespaceId::new(raw).map_err(Into::into)
}

/// Parses a [`uuid::Uuid`]-backed path segment into `T`, mapping a malformed
/// id to a `validation` error.
pub fn parse_uuid_id<T: From<uuid::Uuid>>(raw: &str, field: &str) -> Result<T, crate::error::ApiError> {
    uuid::Uuid::parse_str(raw)
        .map(T::from)
        .map_err(|_err| crate::error::ApiError::validation(format!("{field} is not a valid identifier")))
}
