// crates/ontostore-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Store Plumbing
// Description: Connection options, pragmas, schema versioning, and errors.
// Purpose: Open SQLite files consistently for the cache and document engines.
// Dependencies: ontostore-core, rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Both `SQLite` engines open files through [`open_connection`], which applies
//! the journal, sync, and busy-timeout pragmas described by
//! [`SqliteConnectionOptions`]. Options come from the DSN option bag.
//! Invariants:
//! - Store paths are bounded in length and never name a directory.
//! - Backend failures keep the `SQLite` extended result code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use ontostore_core::ParameterSet;
use ontostore_core::ResourceError;
use ontostore_core::UNKNOWN_BACKEND_CODE;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;
use tracing::warn;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Option key for the busy timeout.
pub const OPTION_BUSY_TIMEOUT_MS: &str = "busy_timeout_ms";
/// Option key for the journal mode.
pub const OPTION_JOURNAL_MODE: &str = "journal_mode";
/// Option key for the sync mode.
pub const OPTION_SYNC_MODE: &str = "sync_mode";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

impl FromStr for SqliteStoreMode {
    type Err = SqliteStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "wal" => Ok(Self::Wal),
            "delete" => Ok(Self::Delete),
            other => Err(SqliteStoreError::Invalid(format!("unsupported journal_mode: {other}"))),
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

impl FromStr for SqliteSyncMode {
    type Err = SqliteStoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "normal" => Ok(Self::Normal),
            other => Err(SqliteStoreError::Invalid(format!("unsupported sync_mode: {other}"))),
        }
    }
}

/// Connection tuning read from the DSN option bag.
///
/// # Invariants
/// - `busy_timeout_ms` is interpreted as milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteConnectionOptions {
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    pub sync_mode: SqliteSyncMode,
}

impl Default for SqliteConnectionOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

impl SqliteConnectionOptions {
    /// Reads options from a parameter set; unknown option keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a known option has an
    /// unusable value.
    pub fn from_params(params: &ParameterSet) -> Result<Self, SqliteStoreError> {
        let mut options = Self::default();
        if let Some(value) = params.option(OPTION_BUSY_TIMEOUT_MS) {
            options.busy_timeout_ms = value
                .parse()
                .map_err(|_| SqliteStoreError::Invalid(format!("invalid busy_timeout_ms: {value}")))?;
        }
        if let Some(value) = params.option(OPTION_JOURNAL_MODE) {
            options.journal_mode = value.parse()?;
        }
        if let Some(value) = params.option(OPTION_SYNC_MODE) {
            options.sync_mode = value.parse()?;
        }
        Ok(options)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Error messages avoid embedding stored values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SqliteStoreError {
    /// Filesystem I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error with its extended result code.
    #[error("sqlite store db error: {message}")]
    Db {
        /// `SQLite` extended result code.
        code: i64,
        /// Engine message.
        message: String,
    },
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid configuration or input.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl SqliteStoreError {
    /// Returns the `SQLite` result code, when the engine produced one.
    #[must_use]
    pub const fn code(&self) -> i64 {
        match self {
            Self::Db {
                code, ..
            } => *code,
            Self::Io(_) | Self::VersionMismatch(_) | Self::Invalid(_) => UNKNOWN_BACKEND_CODE,
        }
    }

    /// Converts a failure raised while opening a resource.
    #[must_use]
    pub fn into_connection_error(self) -> ResourceError {
        match self {
            Self::Invalid(message) => ResourceError::Configuration(message),
            other => {
                warn!(code = other.code(), error = %other, "sqlite open failed");
                ResourceError::connection(other.code(), other.to_string())
            }
        }
    }

    /// Converts a failure raised by a cache operation.
    #[must_use]
    pub fn into_cache_error(self) -> ResourceError {
        warn!(code = self.code(), error = %self, "sqlite cache operation failed");
        ResourceError::cache(self.code(), self.to_string())
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(err: rusqlite::Error) -> Self {
        let code = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => i64::from(failure.extended_code),
            _ => UNKNOWN_BACKEND_CODE,
        };
        Self::Db {
            code,
            message: err.to_string(),
        }
    }
}

impl From<SqliteStoreError> for ResourceError {
    fn from(err: SqliteStoreError) -> Self {
        err.into_connection_error()
    }
}

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Validates a store file path.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Invalid`] when the path is empty, overlong, or
/// names a directory.
pub fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    validate_path_limits(path)?;
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(format!(
            "store path {} must be a file, not a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Validates a path against length limits.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Invalid`] when the path is empty or overlong.
pub fn validate_path_limits(path: &Path) -> Result<(), SqliteStoreError> {
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    let path_string = path.display().to_string();
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    Ok(())
}

/// Opens an `SQLite` connection and applies pragmas.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the file cannot be opened.
pub fn open_connection(path: &Path, options: &SqliteConnectionOptions) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(path, flags)?;
    apply_pragmas(&connection, options)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, options: &SqliteConnectionOptions) -> Result<(), SqliteStoreError> {
    connection.execute_batch(&format!("PRAGMA journal_mode = {};", options.journal_mode.pragma_value()))?;
    connection.execute_batch(&format!("PRAGMA synchronous = {};", options.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(options.busy_timeout_ms))?;
    Ok(())
}

/// Creates the schema on first use or validates the stored version.
///
/// # Errors
///
/// Returns [`SqliteStoreError::VersionMismatch`] when the file carries a
/// different schema version.
pub fn initialize_schema(
    connection: &mut Connection,
    version: i64,
    schema: &str,
) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let stored: Option<i64> =
        tx.query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0)).optional()?;
    match stored {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![version])?;
            tx.execute_batch(schema)?;
        }
        Some(value) if value == version => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!("unsupported schema version: {value}")));
        }
    }
    tx.commit()?;
    Ok(())
}

/// Returns the file size in bytes from page accounting.
///
/// # Errors
///
/// Returns [`SqliteStoreError::Db`] when the pragmas cannot be read.
pub fn database_bytes(connection: &Connection) -> Result<u64, SqliteStoreError> {
    let page_count: i64 = connection.query_row("PRAGMA page_count", params![], |row| row.get(0))?;
    let page_size: i64 = connection.query_row("PRAGMA page_size", params![], |row| row.get(0))?;
    Ok(u64::try_from(page_count.saturating_mul(page_size)).unwrap_or(0))
}

/// Returns the current unix epoch in milliseconds.
#[must_use]
pub fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
