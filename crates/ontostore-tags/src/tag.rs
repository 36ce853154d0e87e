// crates/ontostore-tags/src/tag.rs
// ============================================================================
// Module: Tag Identifiers
// Description: Global and native tag identifiers and the cached tag record.
// Purpose: Provide typed keys and values for both tag cache namespaces.
// Dependencies: ontostore-core, serde
// ============================================================================

//! ## Overview
//! A tag is addressed two ways: by its global identifier ([`Gid`]), a
//! namespaced string such as `:type:string`, and by its native identifier
//! ([`Nid`]), the integer the record store assigned to it. The cache maps
//! GIDs to NIDs and NIDs to [`TagRecord`]s.
//!
//! Every connection parameter has a descriptor tag under
//! [`CONNECTION_GID_PREFIX`] whose data type follows the parameter's kind.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use ontostore_core::ParamKey;
use ontostore_core::ParamKind;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// GID prefix of connection-parameter descriptor tags.
pub const CONNECTION_GID_PREFIX: &str = ":connection:";

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Global tag identifier.
///
/// # Invariants
/// - Opaque UTF-8 string; no normalization is applied by this type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Gid(String);

impl Gid {
    /// Creates a new global identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the descriptor GID of a connection parameter, e.g.
    /// `:connection:host`.
    #[must_use]
    pub fn connection(key: ParamKey) -> Self {
        Self(format!("{CONNECTION_GID_PREFIX}{}", key.label()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for Gid {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Gid {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Native tag identifier assigned by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nid(i64);

impl Nid {
    /// Creates a native identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for Nid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<i64> for Nid {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Tag record cached in the NID namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagRecord {
    /// Native identifier.
    pub nid: Nid,
    /// Global identifier.
    pub gid: Gid,
    /// Data type GID of values tagged with this record.
    pub data_type: Gid,
    /// Cardinality and structure kind GIDs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub kinds: Vec<Gid>,
    /// Short display label.
    pub label: String,
    /// One-line definition.
    pub definition: String,
    /// Longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Returns the data type GID of values of a connection parameter kind.
#[must_use]
pub const fn connection_data_type(kind: ParamKind) -> &'static str {
    match kind {
        ParamKind::Text => ":type:string",
        ParamKind::Port => ":type:int",
        ParamKind::Options => ":type:dict",
    }
}
