// crates/ontostore-store-sqlite/src/documents.rs
// ============================================================================
// Module: SQLite Document Engine
// Description: Server, database, and collection handles over SQLite files.
// Purpose: Back the `sqlite` protocol resource hierarchy.
// Dependencies: ontostore-core, rusqlite, serde_json, tracing
// ============================================================================

//! ## Overview
//! The server tier is a data directory, each database is one
//! `<name>.sqlite3` file inside it, and each collection is a table of JSON
//! documents keyed by id. [`SqliteCollection`] is the native collection
//! handle; it exposes a small document API (insert, upsert, find, delete,
//! count, and JSON field indexes).
//! Invariants:
//! - Database and collection names are restricted to `[A-Za-z0-9_-]`.
//! - Documents are stored as JSON text and returned as parsed values.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use ontostore_core::DocumentEngine;
use ontostore_core::ParamKey;
use ontostore_core::ParameterSet;
use ontostore_core::Protocol;
use ontostore_core::ResourceError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde_json::Value;
use serde_json::json;
use tracing::debug;

use crate::store::SqliteConnectionOptions;
use crate::store::SqliteStoreError;
use crate::store::database_bytes;
use crate::store::initialize_schema;
use crate::store::open_connection;
use crate::store::unix_millis;
use crate::store::validate_path_limits;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File extension of database files.
pub const DATABASE_EXTENSION: &str = "sqlite3";
/// Maximum database or collection name length.
const MAX_NAME_LENGTH: usize = 64;
/// Maximum JSON field path length for indexes.
const MAX_FIELD_LENGTH: usize = 128;
/// Database schema version.
const SCHEMA_VERSION: i64 = 1;
/// Database schema.
const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    created_at INTEGER NOT NULL
);";

// ============================================================================
// SECTION: Names
// ============================================================================

/// Validates a database or collection name.
fn validate_name(kind: &str, name: &str) -> Result<(), SqliteStoreError> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(SqliteStoreError::Invalid(format!(
            "{kind} name must be 1 to {MAX_NAME_LENGTH} characters"
        )));
    }
    if !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-') {
        return Err(SqliteStoreError::Invalid(format!("{kind} name {name} contains invalid characters")));
    }
    Ok(())
}

/// Validates a dotted JSON field path.
fn validate_field(field: &str) -> Result<(), SqliteStoreError> {
    let valid = !field.is_empty()
        && field.len() <= MAX_FIELD_LENGTH
        && field.split('.').all(|segment| {
            !segment.is_empty() && segment.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(SqliteStoreError::Invalid(format!("invalid document field path: {field}")))
    }
}

/// Returns the table holding a collection; callers quote it.
fn collection_table(name: &str) -> String {
    format!("docs_{name}")
}

// ============================================================================
// SECTION: Handles
// ============================================================================

/// Native server handle: a data directory.
#[derive(Debug, Clone)]
pub struct SqliteServer {
    /// Data directory.
    root: PathBuf,
    /// Connection tuning applied to every database.
    options: SqliteConnectionOptions,
}

impl SqliteServer {
    /// Returns the data directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path of the database file for `name`.
    #[must_use]
    pub fn database_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.{DATABASE_EXTENSION}"))
    }

    /// Lists database files in the data directory as `(name, bytes)`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Io`] when the directory cannot be read.
    pub fn list_databases(&self) -> Result<Vec<(String, u64)>, SqliteStoreError> {
        let entries = fs::read_dir(&self.root).map_err(|err| SqliteStoreError::Io(err.to_string()))?;
        let mut databases = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SqliteStoreError::Io(err.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DATABASE_EXTENSION) {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let bytes = entry.metadata().map(|meta| meta.len()).unwrap_or(0);
            databases.push((name.to_string(), bytes));
        }
        databases.sort();
        Ok(databases)
    }
}

/// Native database handle: one `SQLite` file.
#[derive(Debug)]
pub struct SqliteDatabase {
    /// Database name.
    name: String,
    /// File path.
    path: PathBuf,
    /// Serialized connection.
    connection: Mutex<Connection>,
}

impl SqliteDatabase {
    /// Returns the database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Locks the connection.
    fn connection(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Io("sqlite database mutex poisoned".to_string()))
    }

    /// Returns the registered collection names in order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the registry cannot be read.
    pub fn collection_names(&self) -> Result<Vec<String>, SqliteStoreError> {
        let guard = self.connection()?;
        let mut stmt = guard.prepare("SELECT name FROM collections ORDER BY name")?;
        let rows = stmt.query_map(params![], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }
}

/// Native collection handle: one table of JSON documents.
#[derive(Debug)]
pub struct SqliteCollection {
    /// Owning database.
    database: Arc<SqliteDatabase>,
    /// Collection name.
    name: String,
    /// Backing table.
    table: String,
}

impl SqliteCollection {
    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inserts a new document.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] with a constraint code when `id`
    /// already exists.
    pub fn insert(&self, id: &str, document: &Value) -> Result<(), SqliteStoreError> {
        let body = encode_document(document)?;
        let guard = self.database.connection()?;
        guard.execute(
            &format!("INSERT INTO \"{}\" (id, body, updated_at) VALUES (?1, ?2, ?3)", self.table),
            params![id, body, unix_millis()],
        )?;
        Ok(())
    }

    /// Inserts or replaces a document.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the write fails.
    pub fn upsert(&self, id: &str, document: &Value) -> Result<(), SqliteStoreError> {
        let body = encode_document(document)?;
        let guard = self.database.connection()?;
        guard.execute(
            &format!("INSERT OR REPLACE INTO \"{}\" (id, body, updated_at) VALUES (?1, ?2, ?3)", self.table),
            params![id, body, unix_millis()],
        )?;
        Ok(())
    }

    /// Fetches a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the read fails or the stored body is
    /// not JSON.
    pub fn find(&self, id: &str) -> Result<Option<Value>, SqliteStoreError> {
        let guard = self.database.connection()?;
        let body: Option<String> = guard
            .query_row(&format!("SELECT body FROM \"{}\" WHERE id = ?1", self.table), params![id], |row| {
                row.get(0)
            })
            .optional()?;
        body.map(|body| decode_document(&body)).transpose()
    }

    /// Returns `(id, document)` pairs whose `field` equals `value`, in id order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for an invalid field path or a
    /// non-scalar value, and [`SqliteStoreError::Db`] when the read fails.
    pub fn find_by(&self, field: &str, value: &Value) -> Result<Vec<(String, Value)>, SqliteStoreError> {
        validate_field(field)?;
        let guard = self.database.connection()?;
        let sql = format!(
            "SELECT id, body FROM \"{}\" WHERE json_extract(body, '$.{field}') = ?1 ORDER BY id",
            self.table
        );
        let mut stmt = guard.prepare(&sql)?;
        let mut rows = match value {
            Value::String(text) => stmt.query(params![text])?,
            Value::Bool(flag) => stmt.query(params![i64::from(*flag)])?,
            Value::Number(number) => match (number.as_i64(), number.as_f64()) {
                (Some(int), _) => stmt.query(params![int])?,
                (None, Some(float)) => stmt.query(params![float])?,
                (None, None) => {
                    return Err(SqliteStoreError::Invalid("unsupported numeric value".to_string()));
                }
            },
            Value::Null | Value::Array(_) | Value::Object(_) => {
                return Err(SqliteStoreError::Invalid("find_by expects a scalar value".to_string()));
            }
        };
        let mut found = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let body: String = row.get(1)?;
            found.push((id, decode_document(&body)?));
        }
        Ok(found)
    }

    /// Deletes a document, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the delete fails.
    pub fn delete(&self, id: &str) -> Result<bool, SqliteStoreError> {
        let guard = self.database.connection()?;
        let removed = guard.execute(&format!("DELETE FROM \"{}\" WHERE id = ?1", self.table), params![id])?;
        Ok(removed > 0)
    }

    /// Returns the number of documents.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the count fails.
    pub fn count(&self) -> Result<u64, SqliteStoreError> {
        let guard = self.database.connection()?;
        let count: i64 =
            guard.query_row(&format!("SELECT COUNT(1) FROM \"{}\"", self.table), params![], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Creates an index on a dotted JSON field path, returning its name.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] for an invalid field path and
    /// [`SqliteStoreError::Db`] when the index cannot be created.
    pub fn create_index(&self, field: &str) -> Result<String, SqliteStoreError> {
        validate_field(field)?;
        let index = format!("ix_{}_{}", self.table, field.replace('.', "__"));
        let guard = self.database.connection()?;
        guard.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS \"{index}\" ON \"{}\" (json_extract(body, '$.{field}'));",
            self.table
        ))?;
        debug!(collection = %self.name, index = %index, "collection index created");
        Ok(index)
    }

    /// Returns the index names on this collection in order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Db`] when the catalog cannot be read.
    pub fn index_names(&self) -> Result<Vec<String>, SqliteStoreError> {
        let guard = self.database.connection()?;
        let mut stmt = guard.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND name NOT LIKE \
             'sqlite_autoindex%' ORDER BY name",
        )?;
        let rows = stmt.query_map(params![self.table], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }
}

/// Serializes a document body.
fn encode_document(document: &Value) -> Result<String, SqliteStoreError> {
    serde_json::to_string(document).map_err(|err| SqliteStoreError::Invalid(err.to_string()))
}

/// Parses a stored document body.
fn decode_document(body: &str) -> Result<Value, SqliteStoreError> {
    serde_json::from_str(body).map_err(|err| SqliteStoreError::Invalid(format!("stored document is not json: {err}")))
}

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Document engine for the `sqlite` protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDocumentEngine;

impl SqliteDocumentEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DocumentEngine for SqliteDocumentEngine {
    const NAME: &'static str = "sqlite";

    type Server = SqliteServer;
    type Database = SqliteDatabase;
    type Collection = SqliteCollection;

    fn validate_server(&self, params: &ParameterSet) -> Result<(), ResourceError> {
        let root = params
            .text(ParamKey::Socket)
            .ok_or_else(|| ResourceError::configuration("sqlite server requires a data directory path"))?;
        validate_path_limits(Path::new(root)).map_err(SqliteStoreError::into_connection_error)?;
        SqliteConnectionOptions::from_params(params).map_err(SqliteStoreError::into_connection_error)?;
        Ok(())
    }

    fn connect_server(&self, params: &ParameterSet) -> Result<SqliteServer, ResourceError> {
        let root = params
            .text(ParamKey::Socket)
            .map(PathBuf::from)
            .ok_or_else(|| ResourceError::configuration("sqlite server requires a data directory path"))?;
        let options =
            SqliteConnectionOptions::from_params(params).map_err(SqliteStoreError::into_connection_error)?;
        if root.exists() && !root.is_dir() {
            return Err(ResourceError::configuration(format!(
                "sqlite data path {} is not a directory",
                root.display()
            )));
        }
        fs::create_dir_all(&root)
            .map_err(|err| SqliteStoreError::Io(err.to_string()).into_connection_error())?;
        Ok(SqliteServer {
            root,
            options,
        })
    }

    fn connect_database(
        &self,
        server: &Arc<SqliteServer>,
        name: &str,
        _params: &ParameterSet,
    ) -> Result<SqliteDatabase, ResourceError> {
        validate_name("database", name).map_err(SqliteStoreError::into_connection_error)?;
        let path = server.database_path(name);
        let mut connection =
            open_connection(&path, &server.options).map_err(SqliteStoreError::into_connection_error)?;
        initialize_schema(&mut connection, SCHEMA_VERSION, SCHEMA)
            .map_err(SqliteStoreError::into_connection_error)?;
        Ok(SqliteDatabase {
            name: name.to_string(),
            path,
            connection: Mutex::new(connection),
        })
    }

    fn connect_collection(
        &self,
        database: &Arc<SqliteDatabase>,
        name: &str,
        _params: &ParameterSet,
    ) -> Result<SqliteCollection, ResourceError> {
        validate_name("collection", name).map_err(SqliteStoreError::into_connection_error)?;
        let table = collection_table(name);
        {
            let guard = database.connection().map_err(SqliteStoreError::into_connection_error)?;
            guard
                .execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS \"{table}\" (
                        id TEXT PRIMARY KEY,
                        body TEXT NOT NULL,
                        updated_at INTEGER NOT NULL
                    );"
                ))
                .map_err(|err| SqliteStoreError::from(err).into_connection_error())?;
            guard
                .execute(
                    "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
                    params![name, unix_millis()],
                )
                .map_err(|err| SqliteStoreError::from(err).into_connection_error())?;
        }
        Ok(SqliteCollection {
            database: Arc::clone(database),
            name: name.to_string(),
            table,
        })
    }

    fn server_stats(&self, server: &SqliteServer) -> Result<Value, ResourceError> {
        let databases = server.list_databases().map_err(SqliteStoreError::into_connection_error)?;
        let databases: Vec<Value> =
            databases.into_iter().map(|(name, bytes)| json!({ "name": name, "bytes": bytes })).collect();
        Ok(json!({
            "engine": Protocol::Sqlite.scheme(),
            "root": server.root.display().to_string(),
            "sqlite_version": rusqlite::version(),
            "journal_mode": server.options.journal_mode.pragma_value(),
            "databases": databases,
        }))
    }

    fn database_stats(&self, database: &SqliteDatabase) -> Result<Value, ResourceError> {
        let names = database.collection_names().map_err(SqliteStoreError::into_connection_error)?;
        let guard = database.connection().map_err(SqliteStoreError::into_connection_error)?;
        let mut collections = Vec::with_capacity(names.len());
        for name in &names {
            let count: i64 = guard
                .query_row(&format!("SELECT COUNT(1) FROM \"{}\"", collection_table(name)), params![], |row| {
                    row.get(0)
                })
                .map_err(|err| SqliteStoreError::from(err).into_connection_error())?;
            collections.push(json!({ "name": name, "documents": count }));
        }
        let bytes = database_bytes(&guard).map_err(SqliteStoreError::into_connection_error)?;
        let freelist: i64 = guard
            .query_row("PRAGMA freelist_count", params![], |row| row.get(0))
            .map_err(|err| SqliteStoreError::from(err).into_connection_error())?;
        Ok(json!({
            "name": database.name,
            "path": database.path.display().to_string(),
            "bytes": bytes,
            "freelist_pages": freelist,
            "collections": collections,
        }))
    }

    fn collection_stats(&self, collection: &SqliteCollection) -> Result<Value, ResourceError> {
        let documents = collection.count().map_err(SqliteStoreError::into_connection_error)?;
        let indexes = collection.index_names().map_err(SqliteStoreError::into_connection_error)?;
        Ok(json!({
            "name": collection.name,
            "database": collection.database.name,
            "documents": documents,
            "indexes": indexes,
        }))
    }
}
