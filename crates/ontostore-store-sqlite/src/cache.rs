// crates/ontostore-store-sqlite/src/cache.rs
// ============================================================================
// Module: SQLite Cache Engine
// Description: Key/value cache engine storing entries in SQLite files.
// Purpose: Serve `sqlite+cache` resources with TTL-aware entries.
// Dependencies: ontostore-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Each registered target is a `SQLite` file holding one `cache_entries`
//! table. Keys are spread across files by [`CacheKey::shard`]. Entries are
//! partitioned by store name: the persistent id when set, otherwise
//! [`DEFAULT_STORE`], so several caches can share one file.
//! Invariants:
//! - Text and integer keys live in separate key spaces.
//! - Expired entries are never returned; they are purged lazily.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Mutex;

use ontostore_core::CacheBackend;
use ontostore_core::CacheEngine;
use ontostore_core::CacheKey;
use ontostore_core::CacheTarget;
use ontostore_core::NO_EXPIRY;
use ontostore_core::Outcome;
use ontostore_core::ParamKey;
use ontostore_core::ParameterSet;
use ontostore_core::Protocol;
use ontostore_core::ResourceError;
use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde_json::Value;
use serde_json::json;

use crate::store::SqliteConnectionOptions;
use crate::store::SqliteStoreError;
use crate::store::database_bytes;
use crate::store::initialize_schema;
use crate::store::open_connection;
use crate::store::unix_millis;
use crate::store::validate_store_path;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Store partition used when no persistent id is set.
pub const DEFAULT_STORE: &str = "default";
/// Cache schema version.
const SCHEMA_VERSION: i64 = 1;
/// Cache schema.
const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    store TEXT NOT NULL,
    kind INTEGER NOT NULL,
    key TEXT NOT NULL,
    value BLOB NOT NULL,
    expires_at INTEGER,
    PRIMARY KEY (store, kind, key)
);
CREATE INDEX IF NOT EXISTS idx_cache_entries_expiry ON cache_entries (expires_at);";
/// Key kind column value for text keys.
const KIND_TEXT: i64 = 0;
/// Key kind column value for integer keys.
const KIND_INTEGER: i64 = 1;

// ============================================================================
// SECTION: Engine
// ============================================================================

/// Cache engine for the `sqlite+cache` protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteCacheEngine;

impl SqliteCacheEngine {
    /// Creates the engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// Returns the file paths named by cache targets.
fn target_paths(targets: &[CacheTarget]) -> Result<Vec<PathBuf>, ResourceError> {
    targets
        .iter()
        .map(|target| match target {
            CacheTarget::Socket(path) => Ok(path.clone()),
            CacheTarget::Tcp {
                ..
            } => Err(ResourceError::configuration(format!(
                "sqlite cache target {target} must be a file path"
            ))),
        })
        .collect()
}

impl CacheEngine for SqliteCacheEngine {
    fn protocol(&self) -> Protocol {
        Protocol::SqliteCache
    }

    fn validate(&self, targets: &[CacheTarget], params: &ParameterSet) -> Result<(), ResourceError> {
        for path in target_paths(targets)? {
            validate_store_path(&path).map_err(SqliteStoreError::into_connection_error)?;
        }
        SqliteConnectionOptions::from_params(params).map_err(SqliteStoreError::into_connection_error)?;
        Ok(())
    }

    fn connect(
        &self,
        targets: &[CacheTarget],
        params: &ParameterSet,
    ) -> Result<Box<dyn CacheBackend>, ResourceError> {
        let options =
            SqliteConnectionOptions::from_params(params).map_err(SqliteStoreError::into_connection_error)?;
        let mut shards = Vec::with_capacity(targets.len());
        for path in target_paths(targets)? {
            let mut connection =
                open_connection(&path, &options).map_err(SqliteStoreError::into_connection_error)?;
            initialize_schema(&mut connection, SCHEMA_VERSION, SCHEMA)
                .map_err(SqliteStoreError::into_connection_error)?;
            shards.push(CacheShard {
                path,
                connection: Mutex::new(connection),
            });
        }
        let store = params.text(ParamKey::PersistentId).unwrap_or(DEFAULT_STORE).to_string();
        Ok(Box::new(SqliteCacheBackend {
            store,
            shards,
        }))
    }
}

// ============================================================================
// SECTION: Backend
// ============================================================================

/// One cache file.
struct CacheShard {
    /// File path.
    path: PathBuf,
    /// Serialized connection.
    connection: Mutex<Connection>,
}

/// Live `SQLite` cache handle.
pub struct SqliteCacheBackend {
    /// Store partition.
    store: String,
    /// Cache files in target order.
    shards: Vec<CacheShard>,
}

/// Returns the kind and key columns for a cache key.
fn key_columns(key: &CacheKey) -> (i64, String) {
    match key {
        CacheKey::Text(text) => (KIND_TEXT, text.clone()),
        CacheKey::Integer(value) => (KIND_INTEGER, value.to_string()),
    }
}

impl SqliteCacheBackend {
    /// Returns the store partition.
    #[must_use]
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Runs `op` against the shard holding `key`.
    fn with_shard<T>(
        &self,
        key: &CacheKey,
        op: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let shard = self
            .shards
            .get(key.shard(self.shards.len()))
            .ok_or_else(|| SqliteStoreError::Invalid("sqlite cache has no shards".to_string()))?;
        let guard = shard
            .connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite cache mutex poisoned".to_string()))?;
        op(&guard)
    }

    /// Runs `op` against every shard in order.
    fn for_each_shard(
        &self,
        mut op: impl FnMut(&CacheShard, &Connection) -> Result<(), SqliteStoreError>,
    ) -> Result<(), SqliteStoreError> {
        for shard in &self.shards {
            let guard = shard
                .connection
                .lock()
                .map_err(|_| SqliteStoreError::Io("sqlite cache mutex poisoned".to_string()))?;
            op(shard, &guard)?;
        }
        Ok(())
    }

    /// Removes expired entries from one shard.
    fn purge_expired(&self, connection: &Connection, now: i64) -> Result<(), SqliteStoreError> {
        connection.execute(
            "DELETE FROM cache_entries WHERE store = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![self.store, now],
        )?;
        Ok(())
    }
}

impl CacheBackend for SqliteCacheBackend {
    fn set(&self, key: &CacheKey, value: &[u8], ttl: u32) -> Result<(), ResourceError> {
        let (kind, key_text) = key_columns(key);
        let expires_at =
            (ttl != NO_EXPIRY).then(|| unix_millis().saturating_add(i64::from(ttl).saturating_mul(1_000)));
        self.with_shard(key, |connection| {
            connection.execute(
                "INSERT OR REPLACE INTO cache_entries (store, kind, key, value, expires_at) VALUES (?1, \
                 ?2, ?3, ?4, ?5)",
                params![self.store, kind, key_text, value, expires_at],
            )?;
            Ok(())
        })
        .map_err(SqliteStoreError::into_cache_error)
    }

    fn get(&self, key: &CacheKey) -> Outcome<Vec<u8>> {
        let (kind, key_text) = key_columns(key);
        let now = unix_millis();
        self.with_shard(key, |connection| {
            let row: Option<(Vec<u8>, Option<i64>)> = connection
                .query_row(
                    "SELECT value, expires_at FROM cache_entries WHERE store = ?1 AND kind = ?2 AND key = \
                     ?3",
                    params![self.store, kind, key_text],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            match row {
                Some((_, Some(expires_at))) if expires_at <= now => {
                    self.purge_expired(connection, now)?;
                    Ok(None)
                }
                Some((value, _)) => Ok(Some(value)),
                None => Ok(None),
            }
        })
        .map_err(SqliteStoreError::into_cache_error)
        .into()
    }

    fn delete(&self, key: &CacheKey) -> Outcome<()> {
        let (kind, key_text) = key_columns(key);
        let now = unix_millis();
        self.with_shard(key, |connection| {
            let removed = connection.execute(
                "DELETE FROM cache_entries WHERE store = ?1 AND kind = ?2 AND key = ?3 AND (expires_at \
                 IS NULL OR expires_at > ?4)",
                params![self.store, kind, key_text, now],
            )?;
            Ok((removed > 0).then_some(()))
        })
        .map_err(SqliteStoreError::into_cache_error)
        .into()
    }

    fn flush(&self) -> Result<(), ResourceError> {
        self.for_each_shard(|_, connection| {
            connection.execute("DELETE FROM cache_entries WHERE store = ?1", params![self.store])?;
            Ok(())
        })
        .map_err(SqliteStoreError::into_cache_error)
    }

    fn item_count(&self) -> Result<u64, ResourceError> {
        let now = unix_millis();
        let mut total: u64 = 0;
        self.for_each_shard(|_, connection| {
            self.purge_expired(connection, now)?;
            let count: i64 = connection.query_row(
                "SELECT COUNT(1) FROM cache_entries WHERE store = ?1",
                params![self.store],
                |row| row.get(0),
            )?;
            total = total.saturating_add(u64::try_from(count).unwrap_or(0));
            Ok(())
        })
        .map_err(SqliteStoreError::into_cache_error)?;
        Ok(total)
    }

    fn stats(&self) -> Result<Value, ResourceError> {
        let mut shards = Vec::with_capacity(self.shards.len());
        self.for_each_shard(|shard, connection| {
            let items: i64 = connection.query_row(
                "SELECT COUNT(1) FROM cache_entries WHERE store = ?1",
                params![self.store],
                |row| row.get(0),
            )?;
            shards.push(json!({
                "path": shard.path.display().to_string(),
                "items": items,
                "bytes": database_bytes(connection)?,
            }));
            Ok(())
        })
        .map_err(SqliteStoreError::into_cache_error)?;
        Ok(json!({
            "engine": Protocol::SqliteCache.scheme(),
            "sqlite_version": rusqlite::version(),
            "store": self.store,
            "shards": shards,
        }))
    }
}
