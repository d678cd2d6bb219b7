// crates/mesaplane-core/src/core/identifiers.rs
// ============================================================================
// Module: Mesaplane Identifiers
// Description: Canonical newtype identifiers for control-plane entities.
// Purpose: Prevent identifier confusion across entity boundaries at compile time.
// Dependencies: serde, uuid
// ============================================================================

//! ## Overview
//! Every control-plane entity is addressed through a dedicated newtype rather
//! than a bare `Uuid` or `String`. This keeps a `RunId` from being passed
//! where a `PipelineId` is expected, and keeps slug validation localized to
//! the one type that owns it.
//!
//! Invariants:
//! - Identifiers are transparent for serialization; wire format is unchanged
//!   from the wrapped type.
//! - `NamespaceId` enforces the slug shape at construction; all other
//!   identifiers wrap a `Uuid` and carry no validation of their own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

// ============================================================================
// SECTION: Namespace Identifier
// ============================================================================

/// Maximum length, in bytes, of a namespace slug.
pub const NAMESPACE_SLUG_MAX_LEN: usize = 128;

/// Errors returned when constructing a [`NamespaceId`] from an untrusted string.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SlugError {
    /// Slug is empty.
    #[error("slug must not be empty")]
    Empty,
    /// Slug exceeds the maximum length.
    #[error("slug exceeds {NAMESPACE_SLUG_MAX_LEN} bytes")]
    TooLong,
    /// Slug contains a character outside `[a-z0-9_-]`, or does not start with a letter.
    #[error("slug must start with a lowercase letter and contain only [a-z0-9_-]")]
    InvalidShape,
}

/// Validates a slug per the shared contract: lowercase-letter start,
/// `[a-z0-9_-]` body, `<= 128` bytes.
///
/// # Errors
///
/// Returns [`SlugError`] when the input does not satisfy the shape.
pub fn validate_slug(raw: &str) -> Result<(), SlugError> {
    if raw.is_empty() {
        return Err(SlugError::Empty);
    }
    if raw.len() > NAMESPACE_SLUG_MAX_LEN {
        return Err(SlugError::TooLong);
    }
    let mut chars = raw.chars();
    let Some(first) = chars.next() else {
        return Err(SlugError::Empty);
    };
    if !first.is_ascii_lowercase() {
        return Err(SlugError::InvalidShape);
    }
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-') {
        return Err(SlugError::InvalidShape);
    }
    Ok(())
}

/// Namespace identifier: a validated slug, unique across the deployment.
///
/// # Invariants
/// - Always satisfies [`validate_slug`]; there is no unchecked constructor.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceId(String);

impl NamespaceId {
    /// Creates a namespace identifier from a raw slug.
    ///
    /// # Errors
    ///
    /// Returns [`SlugError`] when `raw` does not satisfy the slug shape.
    pub fn new(raw: impl Into<String>) -> Result<Self, SlugError> {
        let raw = raw.into();
        validate_slug(&raw)?;
        Ok(Self(raw))
    }

    /// Returns the well-known default namespace identifier.
    #[must_use]
    pub fn default_namespace() -> Self {
        Self("default".to_string())
    }

    /// Returns the slug as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for NamespaceId {
    type Error = SlugError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for NamespaceId {
    type Error = SlugError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Uuid-Backed Identifiers
// ============================================================================

/// Declares a `Uuid`-backed newtype identifier with the standard trait set.
macro_rules! uuid_identifier {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        ///
        /// # Invariants
        /// - Wraps a [`Uuid`]; equality and ordering follow the wrapped value.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generates a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wraps an existing [`Uuid`] value, e.g. one read back from storage.
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the wrapped [`Uuid`].
            #[must_use]
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

uuid_identifier!(PipelineId, "Pipeline identifier.");
uuid_identifier!(RunId, "Run identifier.");
uuid_identifier!(ScheduleId, "Schedule identifier.");
uuid_identifier!(TriggerId, "Trigger identifier.");
uuid_identifier!(LandingZoneId, "Landing zone identifier.");
uuid_identifier!(LandingFileId, "Landing file identifier.");
uuid_identifier!(QualityTestId, "Quality test identifier.");
uuid_identifier!(QualityResultId, "Quality result identifier.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_id_rejects_uppercase() {
        assert_eq!(NamespaceId::new("Default").unwrap_err(), SlugError::InvalidShape);
    }

    #[test]
    fn namespace_id_rejects_leading_digit() {
        assert_eq!(NamespaceId::new("1ns").unwrap_err(), SlugError::InvalidShape);
    }

    #[test]
    fn namespace_id_accepts_valid_slug() {
        assert!(NamespaceId::new("sales-eu_1").is_ok());
    }

    #[test]
    fn namespace_id_rejects_empty() {
        assert_eq!(NamespaceId::new("").unwrap_err(), SlugError::Empty);
    }

    #[test]
    fn namespace_id_rejects_too_long() {
        let long = "a".repeat(NAMESPACE_SLUG_MAX_LEN + 1);
        assert_eq!(NamespaceId::new(long).unwrap_err(), SlugError::TooLong);
    }

    #[test]
    fn run_id_round_trips_through_uuid() {
        let id = RunId::new();
        let restored = RunId::from_uuid(id.as_uuid());
        assert_eq!(id, restored);
    }
}
