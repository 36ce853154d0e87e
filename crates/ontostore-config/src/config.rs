// crates/ontostore-config/src/config.rs
// ============================================================================
// Module: Ontostore Configuration
// Description: Configuration model and loader for ontostore.toml.
// Purpose: Load, parse, and validate operator configuration fail-closed.
// Dependencies: ontostore-core, serde, thiserror, toml
// ============================================================================

//! ## Overview
//! [`OntostoreConfig::load`] resolves the config path (explicit argument,
//! then `ONTOSTORE_CONFIG`, then `ontostore.toml`), enforces path and size
//! limits, parses TOML, and validates every section.
//! Invariants:
//! - Unknown keys are rejected.
//! - Every configured DSN parses and names a protocol of the right kind.
//! - A loaded configuration has passed [`OntostoreConfig::validate`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use ontostore_core::CacheTarget;
use ontostore_core::ParamKey;
use ontostore_core::ParameterSet;
use ontostore_core::Protocol;
use ontostore_core::ResourceKind;
use ontostore_core::dsn;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits and Defaults
// ============================================================================

/// Default config file name.
const DEFAULT_CONFIG_NAME: &str = "ontostore.toml";
/// Environment variable naming the config file.
pub const CONFIG_ENV_VAR: &str = "ONTOSTORE_CONFIG";
/// Maximum config file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of one path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum DSN length.
pub(crate) const MAX_DSN_LENGTH: usize = 4096;
/// Maximum number of extra cache targets.
pub(crate) const MAX_CACHE_TARGETS: usize = 64;
/// Maximum log filter length.
pub(crate) const MAX_LOG_FILTER_LENGTH: usize = 1024;
/// Default log filter.
const DEFAULT_LOG_FILTER: &str = "info";

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Ontostore configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OntostoreConfig {
    /// Cache resource configuration.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Document store configuration.
    #[serde(default)]
    pub documents: DocumentsConfig,
    /// Tag cache configuration.
    #[serde(default)]
    pub tags: TagsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Cache resource configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Cache DSN (`memcached://` or `sqlite+cache://`).
    #[serde(default)]
    pub dsn: Option<String>,
    /// Extra targets registered after the DSN-derived one.
    #[serde(default)]
    pub targets: Vec<String>,
}

/// Document store configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DocumentsConfig {
    /// Server DSN (`sqlite://`).
    #[serde(default)]
    pub dsn: Option<String>,
    /// Database name; overrides the DSN `database` query key.
    #[serde(default)]
    pub database: Option<String>,
    /// Collection name; overrides the DSN `collection` query key.
    #[serde(default)]
    pub collection: Option<String>,
}

/// Tag cache configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TagsConfig {
    /// Seed table file; the built-in table is used when unset.
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log filter directives, in `RUST_LOG` syntax.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Returns the default log filter.
fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}

// ============================================================================
// SECTION: Loading and Validation
// ============================================================================

impl OntostoreConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        Self::from_toml(content)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] when validation fails.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.cache.validate()?;
        self.documents.validate()?;
        self.tags.validate()?;
        self.logging.validate()
    }
}

impl CacheConfig {
    /// Validates cache configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let Some(dsn) = &self.dsn else {
            if self.targets.is_empty() {
                return Ok(());
            }
            return Err(ConfigError::Invalid("cache.targets requires cache.dsn".to_string()));
        };
        validate_dsn("cache.dsn", dsn, ResourceKind::Cache)?;
        if self.targets.len() > MAX_CACHE_TARGETS {
            return Err(ConfigError::Invalid(format!("cache.targets exceeds {MAX_CACHE_TARGETS} entries")));
        }
        for target in &self.targets {
            target
                .parse::<CacheTarget>()
                .map_err(|err| ConfigError::Invalid(format!("cache.targets: {err}")))?;
        }
        Ok(())
    }

    /// Returns the parsed extra targets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a target does not parse.
    pub fn parsed_targets(&self) -> Result<Vec<CacheTarget>, ConfigError> {
        self.targets
            .iter()
            .map(|target| {
                target.parse::<CacheTarget>().map_err(|err| ConfigError::Invalid(format!("cache.targets: {err}")))
            })
            .collect()
    }
}

impl DocumentsConfig {
    /// Validates document store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let Some(dsn) = &self.dsn else {
            if self.database.is_some() || self.collection.is_some() {
                return Err(ConfigError::Invalid("documents names require documents.dsn".to_string()));
            }
            return Ok(());
        };
        let params = validate_dsn("documents.dsn", dsn, ResourceKind::Documents)?;
        for (field, name) in [("documents.database", &self.database), ("documents.collection", &self.collection)] {
            if name.as_deref().is_some_and(|name| name.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
            }
        }
        if self.collection_name(&params).is_some() && self.database_name(&params).is_none() {
            return Err(ConfigError::Invalid("documents.collection requires a database".to_string()));
        }
        Ok(())
    }

    /// Returns the configured database name, falling back to the DSN.
    #[must_use]
    pub fn database_name(&self, params: &ParameterSet) -> Option<String> {
        self.database.clone().or_else(|| params.text(ParamKey::Database).map(str::to_string))
    }

    /// Returns the configured collection name, falling back to the DSN.
    #[must_use]
    pub fn collection_name(&self, params: &ParameterSet) -> Option<String> {
        self.collection.clone().or_else(|| params.text(ParamKey::Collection).map(str::to_string))
    }
}

impl TagsConfig {
    /// Validates tag cache configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(path) = &self.seed_path {
            validate_path_string("tags.seed_path", &path.to_string_lossy())?;
        }
        Ok(())
    }
}

impl LoggingConfig {
    /// Validates logging configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        let filter = self.filter.trim();
        if filter.is_empty() {
            return Err(ConfigError::Invalid("logging.filter must be non-empty".to_string()));
        }
        if filter.len() > MAX_LOG_FILTER_LENGTH {
            return Err(ConfigError::Invalid("logging.filter exceeds max length".to_string()));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Parses a DSN and checks that its protocol serves `kind`.
fn validate_dsn(field: &str, value: &str, kind: ResourceKind) -> Result<ParameterSet, ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if value.len() > MAX_DSN_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    let params = dsn::parse(value).map_err(|err| ConfigError::Invalid(format!("{field}: {err}")))?;
    let protocol = Protocol::from_params(&params).map_err(|err| ConfigError::Invalid(format!("{field}: {err}")))?;
    if protocol.kind() != kind {
        return Err(ConfigError::Invalid(format!("{field}: protocol {protocol} does not serve this resource")));
    }
    Ok(params)
}

// ============================================================================
// SECTION: Tests
// ============================================================================
