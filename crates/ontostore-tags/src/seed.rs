// crates/ontostore-tags/src/seed.rs
// ============================================================================
// Module: Tag Seed Table
// Description: Versioned set of tags written into an empty tag cache.
// Purpose: Load and validate built-in or operator-supplied seed tags.
// Dependencies: ontostore-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! A seed table is TOML data: a `version` and a `[[tags]]` array of
//! [`TagRecord`]s. The built-in table ships with the crate; operators may
//! point at their own file.
//! Invariants:
//! - `version` is at least 1.
//! - GIDs are non-blank and unique; NIDs are positive and unique.
//! - Connection descriptor tags name a known parameter and carry the data
//!   type of its value kind.
//! - Tables are validated before a cache ever sees them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use ontostore_core::ParamKey;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::tag::CONNECTION_GID_PREFIX;
use crate::tag::TagRecord;
use crate::tag::connection_data_type;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Built-in seed table source.
const BUILTIN_SEED: &str = include_str!("../data/builtin_tags.toml");
/// Maximum seed file size in bytes.
pub const MAX_SEED_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length for seed files.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of one path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Seed table loading or validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeedError {
    /// I/O failure while reading a seed file.
    #[error("seed io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("seed parse error: {0}")]
    Parse(String),
    /// Structurally valid table breaking a seed invariant.
    #[error("invalid seed table: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Seed Table
// ============================================================================

/// Versioned list of tags written into an empty tag cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SeedTable {
    /// Table revision.
    pub version: u32,
    /// Seed tags.
    #[serde(default)]
    pub tags: Vec<TagRecord>,
}

impl SeedTable {
    /// Returns the built-in seed table.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError`] if the bundled data fails validation.
    pub fn builtin() -> Result<Self, SeedError> {
        Self::from_toml(BUILTIN_SEED)
    }

    /// Parses and validates a seed table from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::Parse`] for malformed TOML and
    /// [`SeedError::Invalid`] when validation fails.
    pub fn from_toml(text: &str) -> Result<Self, SeedError> {
        let table: Self = toml::from_str(text).map_err(|err| SeedError::Parse(err.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    /// Loads and validates a seed table file.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError`] when the path breaks length limits, the file
    /// cannot be read, exceeds [`MAX_SEED_FILE_SIZE`], is not UTF-8, or
    /// fails parsing or validation.
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        validate_path(path)?;
        let bytes = fs::read(path).map_err(|err| SeedError::Io(err.to_string()))?;
        if bytes.len() > MAX_SEED_FILE_SIZE {
            return Err(SeedError::Invalid("seed file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| SeedError::Invalid("seed file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Checks the seed invariants.
    ///
    /// # Errors
    ///
    /// Returns [`SeedError::Invalid`] naming the first violation.
    pub fn validate(&self) -> Result<(), SeedError> {
        if self.version == 0 {
            return Err(SeedError::Invalid("version must be at least 1".to_string()));
        }
        let mut gids = BTreeSet::new();
        let mut nids = BTreeSet::new();
        for tag in &self.tags {
            if tag.gid.as_str().trim().is_empty() {
                return Err(SeedError::Invalid(format!("tag {} has a blank gid", tag.nid)));
            }
            if tag.nid.get() <= 0 {
                return Err(SeedError::Invalid(format!("tag {} has non-positive nid {}", tag.gid, tag.nid)));
            }
            if tag.label.trim().is_empty() {
                return Err(SeedError::Invalid(format!("tag {} has a blank label", tag.gid)));
            }
            if !gids.insert(tag.gid.as_str()) {
                return Err(SeedError::Invalid(format!("duplicate gid {}", tag.gid)));
            }
            if !nids.insert(tag.nid) {
                return Err(SeedError::Invalid(format!("duplicate nid {}", tag.nid)));
            }
            validate_connection_descriptor(tag)?;
        }
        Ok(())
    }

    /// Returns the number of seed tags.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.tags.len()
    }

    /// Returns true when the table holds no tags.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }
}

/// Checks a connection descriptor tag against the parameter it names.
fn validate_connection_descriptor(tag: &TagRecord) -> Result<(), SeedError> {
    let Some(name) = tag.gid.as_str().strip_prefix(CONNECTION_GID_PREFIX) else {
        return Ok(());
    };
    let key = ParamKey::ALL
        .into_iter()
        .find(|key| key.label() == name)
        .ok_or_else(|| SeedError::Invalid(format!("tag {} names no connection parameter", tag.gid)))?;
    let expected = connection_data_type(key.kind());
    if tag.data_type.as_str() != expected {
        return Err(SeedError::Invalid(format!("tag {} must have data type {expected}", tag.gid)));
    }
    Ok(())
}

/// Validates a seed path against length limits.
fn validate_path(path: &Path) -> Result<(), SeedError> {
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SeedError::Invalid("seed path exceeds max length".to_string()));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SeedError::Invalid("seed path component too long".to_string()));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;
    use crate::tag::Gid;
    use crate::tag::Nid;

    #[test]
    fn builtin_table_is_valid() {
        let table = SeedTable::builtin().unwrap();
        assert!(table.version >= 1);
        assert!(!table.is_empty());
        let namespace = table.tags.iter().find(|tag| tag.gid == Gid::from(":namespace")).unwrap();
        assert_eq!(namespace.nid, Nid::new(1));
    }

    #[test]
    fn duplicate_identifiers_are_rejected() {
        let duplicate_gid = r#"
version = 1
[[tags]]
nid = 1
gid = ":a"
data_type = ":type:string"
label = "A"
definition = "first"
[[tags]]
nid = 2
gid = ":a"
data_type = ":type:string"
label = "A again"
definition = "second"
"#;
        let err = SeedTable::from_toml(duplicate_gid).unwrap_err();
        assert_eq!(err, SeedError::Invalid("duplicate gid :a".to_string()));
        let duplicate_nid = r#"
version = 1
[[tags]]
nid = 1
gid = ":a"
data_type = ":type:string"
label = "A"
definition = "first"
[[tags]]
nid = 1
gid = ":b"
data_type = ":type:string"
label = "B"
definition = "second"
"#;
        let err = SeedTable::from_toml(duplicate_nid).unwrap_err();
        assert_eq!(err, SeedError::Invalid("duplicate nid 1".to_string()));
    }

    #[test]
    fn zero_version_and_non_positive_nids_are_rejected() {
        assert!(matches!(SeedTable::from_toml("version = 0"), Err(SeedError::Invalid(_))));
        let negative = r#"
version = 1
[[tags]]
nid = -3
gid = ":neg"
data_type = ":type:int"
label = "Negative"
definition = "bad"
"#;
        assert!(matches!(SeedTable::from_toml(negative), Err(SeedError::Invalid(_))));
    }

    #[test]
    fn builtin_table_describes_every_connection_parameter() {
        let table = SeedTable::builtin().unwrap();
        for key in ParamKey::ALL {
            let gid = Gid::connection(key);
            let tag = table.tags.iter().find(|tag| tag.gid == gid).unwrap();
            assert_eq!(tag.data_type.as_str(), connection_data_type(key.kind()), "{gid}");
        }
    }

    #[test]
    fn connection_descriptors_must_match_parameter_kind() {
        let wrong_type = r#"
version = 1
[[tags]]
nid = 1
gid = ":connection:port"
data_type = ":type:string"
label = "Port"
definition = "TCP port."
"#;
        let err = SeedTable::from_toml(wrong_type).unwrap_err();
        assert_eq!(err, SeedError::Invalid("tag :connection:port must have data type :type:int".to_string()));
        let unknown = wrong_type.replace(":connection:port", ":connection:region");
        let err = SeedTable::from_toml(&unknown).unwrap_err();
        assert_eq!(err, SeedError::Invalid("tag :connection:region names no connection parameter".to_string()));
    }

    #[test]
    fn unknown_fields_fail_parsing() {
        let text = "version = 1\nrevision = 2\n";
        assert!(matches!(SeedTable::from_toml(text), Err(SeedError::Parse(_))));
    }

    #[test]
    fn overlong_seed_path_is_rejected() {
        let component = "a".repeat(MAX_PATH_COMPONENT_LENGTH + 1);
        let err = SeedTable::load(Path::new(&component)).unwrap_err();
        assert_eq!(err, SeedError::Invalid("seed path component too long".to_string()));
    }
}
