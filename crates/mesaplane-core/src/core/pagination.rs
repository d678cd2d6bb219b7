// crates/mesaplane-core/src/core/pagination.rs
// ============================================================================
// Module: Mesaplane Pagination
// Description: Store-side limit/offset pagination shared by every list endpoint.
// Purpose: Make in-memory post-hoc slicing impossible to reach for by construction.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! List endpoints push `limit`/`offset` into the Store rather than fetching
//! everything and slicing in the handler. [`ListParams`] is the only way a
//! caller can ask for a page, and it clamps to the hard cap at construction
//! so a handler cannot accidentally request an unbounded page.

use serde::Deserialize;
use serde::Serialize;

/// Hard server-side cap on page size, regardless of client-requested `limit`.
pub const MAX_PAGE_LIMIT: u32 = 500;

/// Default page size when a client omits `limit`.
pub const DEFAULT_PAGE_LIMIT: u32 = 50;

/// Requested page bounds for a list operation.
///
/// # Invariants
/// - `limit` is always `1..=MAX_PAGE_LIMIT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    /// Maximum rows to return.
    pub limit: u32,
    /// Rows to skip before collecting `limit`.
    pub offset: u32,
}

impl ListParams {
    /// Builds list params from optional client-supplied values, clamping
    /// `limit` into `1..=MAX_PAGE_LIMIT` and defaulting to
    /// [`DEFAULT_PAGE_LIMIT`] when omitted.
    #[must_use]
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        Self { limit, offset: offset.unwrap_or(0) }
    }
}

impl Default for ListParams {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// A page of results plus the total row count for the unfiltered query.
///
/// # Invariants
/// - `items.len() <= limit` of the [`ListParams`] that produced this page.
/// - Consecutive, non-overlapping pages over a stable ordering concatenate
///   to the full result set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    /// Rows for this page.
    pub items: Vec<T>,
    /// Total rows matching the query, ignoring `limit`/`offset`.
    pub total: u64,
}

impl<T> Page<T> {
    /// Builds a page from its parts.
    #[must_use]
    pub const fn new(items: Vec<T>, total: u64) -> Self {
        Self { items, total }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_params_clamps_oversized_limit() {
        let params = ListParams::new(Some(10_000), None);
        assert_eq!(params.limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn list_params_clamps_zero_limit_up_to_one() {
        let params = ListParams::new(Some(0), None);
        assert_eq!(params.limit, 1);
    }

    #[test]
    fn list_params_default_offset_is_zero() {
        let params = ListParams::new(Some(20), None);
        assert_eq!(params.offset, 0);
    }

    proptest::proptest! {
        #[test]
        fn consecutive_pages_concatenate_to_full_set(total in 0u32..200, limit in 1u32..50) {
            let all: Vec<u32> = (0..total).collect();
            let mut offset = 0u32;
            let mut collected = Vec::new();
            loop {
                let params = ListParams::new(Some(limit), Some(offset));
                let page: Vec<u32> = all
                    .iter()
                    .skip(params.offset as usize)
                    .take(params.limit as usize)
                    .copied()
                    .collect();
                if page.is_empty() {
                    break;
                }
                collected.extend_from_slice(&page);
                offset += limit;
            }
            prop_assert_eq!(collected, all);
        }
    }
}
