// crates/mesaplane-store-sqlite/src/codec.rs
// ============================================================================
// Module: SQLite Row Codec
// Description: Timestamp and row<->model conversion helpers shared by every table.
// Purpose: Keep RFC3339 formatting and row mapping in one place instead of
//          scattered across each query.
// Dependencies: mesaplane-core, rusqlite, time
// ============================================================================

use mesaplane_core::StoreError;
use rusqlite::Row;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Formats a timestamp for storage.
#[must_use]
pub fn ts_to_string(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_err| ts.unix_timestamp().to_string())
}

/// Formats an optional timestamp for storage.
#[must_use]
pub fn opt_ts_to_string(ts: Option<OffsetDateTime>) -> Option<String> {
    ts.map(ts_to_string)
}

/// Parses a stored timestamp.
///
/// # Errors
///
/// Returns [`StoreError::Internal`] when the stored value is not valid RFC3339.
pub fn ts_from_string(raw: &str) -> Result<OffsetDateTime, StoreError> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|err| StoreError::Internal(format!("corrupt timestamp column: {err}")))
}

/// Parses an optional stored timestamp.
///
/// # Errors
///
/// Returns [`StoreError::Internal`] when the stored value is not valid RFC3339.
pub fn opt_ts_from_string(raw: Option<String>) -> Result<Option<OffsetDateTime>, StoreError> {
    raw.as_deref().map(ts_from_string).transpose()
}

/// Reads a named column as a [`String`], mapping SQLite errors into [`StoreError`].
///
/// # Errors
///
/// Returns [`StoreError::Internal`] when the column is missing or the wrong type.
pub fn get_string(row: &Row<'_>, idx: &str) -> Result<String, StoreError> {
    row.get(idx).map_err(|err| StoreError::Internal(format!("corrupt column {idx}: {err}")))
}

/// Reads an optional named column as a [`String`].
///
/// # Errors
///
/// Returns [`StoreError::Internal`] when the column exists but is the wrong type.
pub fn get_opt_string(row: &Row<'_>, idx: &str) -> Result<Option<String>, StoreError> {
    row.get(idx).map_err(|err| StoreError::Internal(format!("corrupt column {idx}: {err}")))
}

/// Reads a named column as an `i64`.
///
/// # Errors
///
/// Returns [`StoreError::Internal`] when the column is missing or the wrong type.
pub fn get_i64(row: &Row<'_>, idx: &str) -> Result<i64, StoreError> {
    row.get(idx).map_err(|err| StoreError::Internal(format!("corrupt column {idx}: {err}")))
}

/// Reads an optional named column as an `i64`.
///
/// # Errors
///
/// Returns [`StoreError::Internal`] when the column exists but is the wrong type.
pub fn get_opt_i64(row: &Row<'_>, idx: &str) -> Result<Option<i64>, StoreError> {
    row.get(idx).map_err(|err| StoreError::Internal(format!("corrupt column {idx}: {err}")))
}

/// Reads a named column as a `bool` from SQLite's integer encoding.
///
/// # Errors
///
/// Returns [`StoreError::Internal`] when the column is missing or the wrong type.
pub fn get_bool(row: &Row<'_>, idx: &str) -> Result<bool, StoreError> {
    let raw: i64 = get_i64(row, idx)?;
    Ok(raw != 0)
}
