// crates/ontostore-core/src/hierarchy.rs
// ============================================================================
// Module: Ontostore Resource Hierarchy
// Description: Server, database, and collection resource tiers.
// Purpose: Open document-store tiers on demand, parent first.
// Dependencies: crate::resource, serde_json
// ============================================================================

//! ## Overview
//! Document stores are addressed through three tiers. A
//! [`CollectionResource`] needs an open [`DatabaseResource`], which needs an
//! open [`ServerResource`]; opening a child opens its ancestors first. The
//! backend specifics live behind [`DocumentEngine`].
//!
//! Children hold their parent through an [`Arc`]. Parents track children by
//! name through [`Weak`] references, so a parent never keeps a child alive.
//!
//! Invariants:
//! - A missing parent or tier name fails with
//!   [`ResourceError::Configuration`] before any backend call.
//! - A child's DSN merges the ancestors' parameters with its own.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::Weak;

use serde_json::Value;

use crate::dsn;
use crate::error::ResourceError;
use crate::params::ParamKey;
use crate::params::ParameterSet;
use crate::resource::ConnectionResource;
use crate::resource::ResourceCore;

// ============================================================================
// SECTION: Engine Contract
// ============================================================================

/// Backend logic for each document-store tier.
///
/// The `new_*` factory hooks build the resource objects for each tier; an
/// engine overrides them to customize child construction.
pub trait DocumentEngine: Send + Sync + Sized + 'static {
    /// Engine name used in logs and stats.
    const NAME: &'static str;

    /// Native server handle.
    type Server: Send + Sync;
    /// Native database handle.
    type Database: Send + Sync;
    /// Native collection handle.
    type Collection: Send + Sync;

    /// Checks server parameters before any backend call.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when parameters are missing.
    fn validate_server(&self, _params: &ParameterSet) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Connects the server tier.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend refuses.
    fn connect_server(&self, params: &ParameterSet) -> Result<Self::Server, ResourceError>;

    /// Connects a database on an open server.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend refuses.
    fn connect_database(
        &self,
        server: &Arc<Self::Server>,
        name: &str,
        params: &ParameterSet,
    ) -> Result<Self::Database, ResourceError>;

    /// Connects a collection on an open database.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend refuses.
    fn connect_collection(
        &self,
        database: &Arc<Self::Database>,
        name: &str,
        params: &ParameterSet,
    ) -> Result<Self::Collection, ResourceError>;

    /// Returns server introspection data.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend call fails.
    fn server_stats(&self, server: &Self::Server) -> Result<Value, ResourceError>;

    /// Returns database introspection data.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend call fails.
    fn database_stats(&self, database: &Self::Database) -> Result<Value, ResourceError>;

    /// Returns collection introspection data.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend call fails.
    fn collection_stats(&self, collection: &Self::Collection) -> Result<Value, ResourceError>;

    /// Builds a server resource.
    fn new_server(engine: Arc<Self>, params: ParameterSet) -> Arc<ServerResource<Self>> {
        ServerResource::build(engine, params)
    }

    /// Builds a database resource under `server`.
    fn new_database(server: Arc<ServerResource<Self>>, params: ParameterSet) -> Arc<DatabaseResource<Self>> {
        DatabaseResource::build(Arc::clone(&server.engine), Some(server), params)
    }

    /// Builds a collection resource under `database`.
    fn new_collection(
        database: Arc<DatabaseResource<Self>>,
        params: ParameterSet,
    ) -> Arc<CollectionResource<Self>> {
        CollectionResource::build(Arc::clone(&database.engine), Some(database), params)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Locks a mutex, recovering the data from a poisoned lock.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Returns a tier name parameter or a configuration error.
fn required_name(params: &ParameterSet, key: ParamKey, tier: &str) -> Result<String, ResourceError> {
    params
        .text(key)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ResourceError::configuration(format!("{tier} resource requires a {key} name")))
}

/// Returns a live child by name or builds and registers a new one.
fn child_by_name<C>(
    children: &Mutex<BTreeMap<String, Weak<C>>>,
    name: &str,
    build: impl FnOnce() -> Arc<C>,
) -> Arc<C> {
    let mut guard = lock(children);
    guard.retain(|_, child| child.strong_count() > 0);
    if let Some(child) = guard.get(name).and_then(Weak::upgrade) {
        return child;
    }
    let child = build();
    guard.insert(name.to_string(), Arc::downgrade(&child));
    child
}

// ============================================================================
// SECTION: Server Tier
// ============================================================================

/// Top tier of a document store.
pub struct ServerResource<E: DocumentEngine> {
    /// Backend engine.
    engine: Arc<E>,
    /// Lifecycle state.
    core: ResourceCore<E::Server>,
    /// Self reference handed to children.
    this: Weak<Self>,
    /// Databases handed out, by name.
    databases: Mutex<BTreeMap<String, Weak<DatabaseResource<E>>>>,
}

impl<E: DocumentEngine> ServerResource<E> {
    /// Creates a closed server resource through the engine factory hook.
    #[must_use]
    pub fn new(engine: Arc<E>, params: ParameterSet) -> Arc<Self> {
        E::new_server(engine, params)
    }

    /// Creates a closed server resource from a DSN.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::MalformedDsn`] when the DSN cannot be parsed.
    pub fn from_dsn(engine: Arc<E>, dsn: &str) -> Result<Arc<Self>, ResourceError> {
        Ok(Self::new(engine, dsn::parse(dsn)?))
    }

    /// Constructs the resource; used by the default factory hook.
    #[must_use]
    pub fn build(engine: Arc<E>, params: ParameterSet) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            engine,
            core: ResourceCore::new(params),
            this: this.clone(),
            databases: Mutex::new(BTreeMap::new()),
        })
    }

    /// Returns the backend engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Returns the database resource named `name`, creating it when no live
    /// one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when the name is empty or the
    /// server is being dropped.
    pub fn database(&self, name: &str) -> Result<Arc<DatabaseResource<E>>, ResourceError> {
        if name.is_empty() {
            return Err(ResourceError::configuration("database name is empty"));
        }
        let server = self
            .this
            .upgrade()
            .ok_or_else(|| ResourceError::configuration("server resource is no longer alive"))?;
        let mut params = ParameterSet::new();
        params.insert(ParamKey::Database, name)?;
        Ok(child_by_name(&self.databases, name, || E::new_database(server, params)))
    }

    /// Returns the names of live databases handed out by this server.
    #[must_use]
    pub fn database_names(&self) -> Vec<String> {
        lock(&self.databases)
            .iter()
            .filter(|(_, child)| child.strong_count() > 0)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Returns server introspection data, opening the server if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when the server cannot be opened or queried.
    pub fn stats(&self) -> Result<Value, ResourceError> {
        let handle = self.open()?;
        self.engine.server_stats(&handle)
    }
}

impl<E: DocumentEngine> ConnectionResource for ServerResource<E> {
    type Handle = E::Server;

    const TIER: &'static str = "server";

    fn core(&self) -> &ResourceCore<E::Server> {
        &self.core
    }

    fn validate(&self, params: &ParameterSet) -> Result<(), ResourceError> {
        self.engine.validate_server(params)
    }

    fn connect(&self, params: &ParameterSet) -> Result<E::Server, ResourceError> {
        self.engine.connect_server(params)
    }
}

// ============================================================================
// SECTION: Database Tier
// ============================================================================

/// Database tier; requires a parent server and a database name.
pub struct DatabaseResource<E: DocumentEngine> {
    /// Backend engine.
    engine: Arc<E>,
    /// Lifecycle state.
    core: ResourceCore<E::Database>,
    /// Parent server.
    parent: Mutex<Option<Arc<ServerResource<E>>>>,
    /// Self reference handed to children.
    this: Weak<Self>,
    /// Collections handed out, by name.
    collections: Mutex<BTreeMap<String, Weak<CollectionResource<E>>>>,
}

impl<E: DocumentEngine> DatabaseResource<E> {
    /// Creates a database resource with no parent.
    ///
    /// It cannot be opened until [`DatabaseResource::set_parent`] is called.
    #[must_use]
    pub fn new(engine: Arc<E>, params: ParameterSet) -> Arc<Self> {
        Self::build(engine, None, params)
    }

    /// Constructs the resource; used by the default factory hook.
    #[must_use]
    pub fn build(engine: Arc<E>, parent: Option<Arc<ServerResource<E>>>, params: ParameterSet) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            engine,
            core: ResourceCore::new(params),
            parent: Mutex::new(parent),
            this: this.clone(),
            collections: Mutex::new(BTreeMap::new()),
        })
    }

    /// Returns the parent server, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<ServerResource<E>>> {
        lock(&self.parent).clone()
    }

    /// Attaches a parent server; takes effect at the next open.
    pub fn set_parent(&self, parent: Arc<ServerResource<E>>) {
        *lock(&self.parent) = Some(parent);
        self.core.invalidate_dsn();
    }

    /// Returns the collection resource named `name`, creating it when no live
    /// one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when the name is empty or the
    /// database is being dropped.
    pub fn collection(&self, name: &str) -> Result<Arc<CollectionResource<E>>, ResourceError> {
        if name.is_empty() {
            return Err(ResourceError::configuration("collection name is empty"));
        }
        let database = self
            .this
            .upgrade()
            .ok_or_else(|| ResourceError::configuration("database resource is no longer alive"))?;
        let mut params = ParameterSet::new();
        params.insert(ParamKey::Collection, name)?;
        Ok(child_by_name(&self.collections, name, || E::new_collection(database, params)))
    }

    /// Returns database introspection data, opening the chain if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when the database cannot be opened or queried.
    pub fn stats(&self) -> Result<Value, ResourceError> {
        let handle = self.open()?;
        self.engine.database_stats(&handle)
    }
}

impl<E: DocumentEngine> ConnectionResource for DatabaseResource<E> {
    type Handle = E::Database;

    const TIER: &'static str = "database";

    fn core(&self) -> &ResourceCore<E::Database> {
        &self.core
    }

    fn validate(&self, params: &ParameterSet) -> Result<(), ResourceError> {
        if lock(&self.parent).is_none() {
            return Err(ResourceError::configuration("database resource has no parent server"));
        }
        required_name(params, ParamKey::Database, Self::TIER).map(|_| ())
    }

    fn connect(&self, params: &ParameterSet) -> Result<E::Database, ResourceError> {
        let parent = self
            .parent()
            .ok_or_else(|| ResourceError::configuration("database resource has no parent server"))?;
        let name = required_name(params, ParamKey::Database, Self::TIER)?;
        let server = parent.open()?;
        self.engine.connect_database(&server, &name, params)
    }

    fn dsn_params(&self) -> ParameterSet {
        let mut params = self.core.params();
        if let Some(parent) = self.parent() {
            params.inherit(&parent.dsn_params());
        }
        params
    }
}

// ============================================================================
// SECTION: Collection Tier
// ============================================================================

/// Collection tier; requires a parent database and a collection name.
pub struct CollectionResource<E: DocumentEngine> {
    /// Backend engine.
    engine: Arc<E>,
    /// Lifecycle state.
    core: ResourceCore<E::Collection>,
    /// Parent database.
    parent: Mutex<Option<Arc<DatabaseResource<E>>>>,
}

impl<E: DocumentEngine> CollectionResource<E> {
    /// Creates a collection resource with no parent.
    ///
    /// It cannot be opened until [`CollectionResource::set_parent`] is called.
    #[must_use]
    pub fn new(engine: Arc<E>, params: ParameterSet) -> Arc<Self> {
        Self::build(engine, None, params)
    }

    /// Constructs the resource; used by the default factory hook.
    #[must_use]
    pub fn build(engine: Arc<E>, parent: Option<Arc<DatabaseResource<E>>>, params: ParameterSet) -> Arc<Self> {
        Arc::new(Self {
            engine,
            core: ResourceCore::new(params),
            parent: Mutex::new(parent),
        })
    }

    /// Returns the parent database, if attached.
    #[must_use]
    pub fn parent(&self) -> Option<Arc<DatabaseResource<E>>> {
        lock(&self.parent).clone()
    }

    /// Attaches a parent database; takes effect at the next open.
    pub fn set_parent(&self, parent: Arc<DatabaseResource<E>>) {
        *lock(&self.parent) = Some(parent);
        self.core.invalidate_dsn();
    }

    /// Returns collection introspection data, opening the chain if needed.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when the collection cannot be opened or
    /// queried.
    pub fn stats(&self) -> Result<Value, ResourceError> {
        let handle = self.open()?;
        self.engine.collection_stats(&handle)
    }
}

impl<E: DocumentEngine> ConnectionResource for CollectionResource<E> {
    type Handle = E::Collection;

    const TIER: &'static str = "collection";

    fn core(&self) -> &ResourceCore<E::Collection> {
        &self.core
    }

    fn validate(&self, params: &ParameterSet) -> Result<(), ResourceError> {
        if lock(&self.parent).is_none() {
            return Err(ResourceError::configuration("collection resource has no parent database"));
        }
        required_name(params, ParamKey::Collection, Self::TIER).map(|_| ())
    }

    fn connect(&self, params: &ParameterSet) -> Result<E::Collection, ResourceError> {
        let parent = self
            .parent()
            .ok_or_else(|| ResourceError::configuration("collection resource has no parent database"))?;
        let name = required_name(params, ParamKey::Collection, Self::TIER)?;
        let database = parent.open()?;
        self.engine.connect_collection(&database, &name, params)
    }

    fn dsn_params(&self) -> ParameterSet {
        let mut params = self.core.params();
        if let Some(parent) = self.parent() {
            params.inherit(&parent.dsn_params());
        }
        params
    }
}

// ============================================================================
// SECTION: Debug
// ============================================================================

impl<E: DocumentEngine> fmt::Debug for ServerResource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerResource")
            .field("engine", &E::NAME)
            .field("open", &self.core.is_open())
            .field("databases", &self.database_names())
            .finish_non_exhaustive()
    }
}

impl<E: DocumentEngine> fmt::Debug for DatabaseResource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseResource")
            .field("engine", &E::NAME)
            .field("name", &self.core.params().text(ParamKey::Database).map(str::to_string))
            .field("open", &self.core.is_open())
            .finish_non_exhaustive()
    }
}

impl<E: DocumentEngine> fmt::Debug for CollectionResource<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionResource")
            .field("engine", &E::NAME)
            .field("name", &self.core.params().text(ParamKey::Collection).map(str::to_string))
            .field("open", &self.core.is_open())
            .finish_non_exhaustive()
    }
}
