// crates/ontostore-config/src/connect.rs
// ============================================================================
// Module: Protocol Dispatch
// Description: Builds resources for a DSN by protocol.
// Purpose: Single factory mapping protocols to engines and resource types.
// Dependencies: ontostore-core, ontostore-memcached, ontostore-store-sqlite
// ============================================================================

//! ## Overview
//! [`resource_from_dsn`] is the one place where a [`Protocol`] is mapped to a
//! concrete engine. Resources come back closed; nothing here touches a
//! backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use ontostore_core::CacheEngine;
use ontostore_core::CacheResource;
use ontostore_core::CollectionResource;
use ontostore_core::DatabaseResource;
use ontostore_core::ParameterSet;
use ontostore_core::Protocol;
use ontostore_core::ResourceError;
use ontostore_core::ServerResource;
use ontostore_core::dsn;
use ontostore_memcached::MemcachedEngine;
use ontostore_store_sqlite::SqliteCacheEngine;
use ontostore_store_sqlite::SqliteDocumentEngine;

use crate::config::CacheConfig;
use crate::config::ConfigError;
use crate::config::DocumentsConfig;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Server tier of the `SQLite` document engine.
pub type DocumentServer = ServerResource<SqliteDocumentEngine>;
/// Database tier of the `SQLite` document engine.
pub type DocumentDatabase = DatabaseResource<SqliteDocumentEngine>;
/// Collection tier of the `SQLite` document engine.
pub type DocumentCollection = CollectionResource<SqliteDocumentEngine>;

/// Closed resource built for a DSN.
#[derive(Debug)]
pub enum Resource {
    /// Key/value cache.
    Cache(Arc<CacheResource>),
    /// Document store server tier.
    Documents(Arc<DocumentServer>),
}

/// Document tiers named by configuration.
#[derive(Debug)]
pub struct DocumentTiers {
    /// Server tier.
    pub server: Arc<DocumentServer>,
    /// Database tier, when a database is named.
    pub database: Option<Arc<DocumentDatabase>>,
    /// Collection tier, when a collection is named.
    pub collection: Option<Arc<DocumentCollection>>,
}

// ============================================================================
// SECTION: Dispatch
// ============================================================================

/// Returns the cache engine serving `protocol`.
///
/// # Errors
///
/// Returns [`ResourceError::Configuration`] for protocols that are not caches.
pub fn cache_engine(protocol: Protocol) -> Result<Arc<dyn CacheEngine>, ResourceError> {
    match protocol {
        Protocol::Memcached => Ok(Arc::new(MemcachedEngine::new())),
        Protocol::SqliteCache => Ok(Arc::new(SqliteCacheEngine::new())),
        Protocol::Sqlite => Err(ResourceError::configuration(format!("{protocol} is not a cache protocol"))),
    }
}

/// Builds a closed resource for already parsed parameters.
///
/// # Errors
///
/// Returns [`ResourceError::Configuration`] when the protocol is missing or
/// unknown.
pub fn resource_from_params(params: ParameterSet) -> Result<Resource, ResourceError> {
    let protocol = Protocol::from_params(&params)?;
    match protocol {
        Protocol::Memcached | Protocol::SqliteCache => {
            Ok(Resource::Cache(Arc::new(CacheResource::with_params(cache_engine(protocol)?, params))))
        }
        Protocol::Sqlite => Ok(Resource::Documents(ServerResource::new(Arc::new(SqliteDocumentEngine::new()), params))),
    }
}

/// Builds a closed resource for a DSN.
///
/// # Errors
///
/// Returns [`ResourceError::MalformedDsn`] when the DSN does not parse and
/// [`ResourceError::Configuration`] when its protocol is missing or unknown.
pub fn resource_from_dsn(dsn: &str) -> Result<Resource, ResourceError> {
    resource_from_params(dsn::parse(dsn)?)
}

/// Builds a closed cache resource for a DSN.
///
/// # Errors
///
/// Returns [`ResourceError`] when the DSN does not parse or names a
/// non-cache protocol.
pub fn cache_resource(dsn: &str) -> Result<Arc<CacheResource>, ResourceError> {
    match resource_from_dsn(dsn)? {
        Resource::Cache(cache) => Ok(cache),
        Resource::Documents(_) => Err(ResourceError::configuration(format!("{dsn} does not name a cache"))),
    }
}

/// Builds a closed document server resource for a DSN.
///
/// # Errors
///
/// Returns [`ResourceError`] when the DSN does not parse or names a
/// non-document protocol.
pub fn document_server(dsn: &str) -> Result<Arc<DocumentServer>, ResourceError> {
    match resource_from_dsn(dsn)? {
        Resource::Documents(server) => Ok(server),
        Resource::Cache(_) => Err(ResourceError::configuration(format!("{dsn} does not name a document store"))),
    }
}

// ============================================================================
// SECTION: Configured Resources
// ============================================================================

impl CacheConfig {
    /// Builds the configured cache resource with its extra targets.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no cache is configured or the
    /// configuration does not describe a usable cache.
    pub fn resource(&self) -> Result<Arc<CacheResource>, ConfigError> {
        let dsn = self.dsn.as_deref().ok_or_else(|| ConfigError::Invalid("cache.dsn is not configured".to_string()))?;
        let cache = cache_resource(dsn).map_err(|err| ConfigError::Invalid(format!("cache.dsn: {err}")))?;
        for target in self.parsed_targets()? {
            cache.add_target(target);
        }
        Ok(cache)
    }
}

impl DocumentsConfig {
    /// Builds the configured document tiers.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no document store is configured
    /// or a named tier cannot be created.
    pub fn tiers(&self) -> Result<DocumentTiers, ConfigError> {
        let dsn =
            self.dsn.as_deref().ok_or_else(|| ConfigError::Invalid("documents.dsn is not configured".to_string()))?;
        let params = dsn::parse(dsn).map_err(|err| ConfigError::Invalid(format!("documents.dsn: {err}")))?;
        let server = document_server(dsn).map_err(|err| ConfigError::Invalid(format!("documents.dsn: {err}")))?;
        let database = self
            .database_name(&params)
            .map(|name| server.database(&name))
            .transpose()
            .map_err(|err| ConfigError::Invalid(format!("documents.database: {err}")))?;
        let collection = match (&database, self.collection_name(&params)) {
            (Some(database), Some(name)) => Some(
                database
                    .collection(&name)
                    .map_err(|err| ConfigError::Invalid(format!("documents.collection: {err}")))?,
            ),
            (None, Some(_)) => {
                return Err(ConfigError::Invalid("documents.collection requires a database".to_string()));
            }
            (_, None) => None,
        };
        Ok(DocumentTiers {
            server,
            database,
            collection,
        })
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use ontostore_core::ConnectionResource;

    use super::*;

    #[test]
    fn protocols_dispatch_to_resource_kinds() {
        assert!(matches!(resource_from_dsn("memcached://localhost:11211").unwrap(), Resource::Cache(_)));
        assert!(matches!(resource_from_dsn("sqlite+cache:///tmp/cache.sqlite3").unwrap(), Resource::Cache(_)));
        assert!(matches!(resource_from_dsn("sqlite:///srv/data").unwrap(), Resource::Documents(_)));
    }

    #[test]
    fn dispatched_resources_start_closed() {
        let cache = cache_resource("memcached://localhost").unwrap();
        assert!(!cache.is_open());
        assert_eq!(cache.protocol(), Protocol::Memcached);
        let server = document_server("sqlite:///srv/data").unwrap();
        assert!(!server.is_open());
    }

    #[test]
    fn missing_or_unknown_protocol_is_configuration_error() {
        assert!(resource_from_dsn("/run/memcached.sock").unwrap_err().is_configuration());
        assert!(resource_from_dsn("redis://localhost").unwrap_err().is_configuration());
        assert!(cache_engine(Protocol::Sqlite).unwrap_err().is_configuration());
    }

    #[test]
    fn kind_mismatch_is_configuration_error() {
        assert!(cache_resource("sqlite:///srv/data").unwrap_err().is_configuration());
        assert!(document_server("memcached://localhost").unwrap_err().is_configuration());
    }
}
