// crates/ontostore-core/src/cache.rs
// ============================================================================
// Module: Ontostore Cache Resource
// Description: Key/value cache resource with tri-state lookup outcomes.
// Purpose: Front pluggable cache engines with one connection lifecycle.
// Dependencies: crate::resource, serde_json, sha2
// ============================================================================

//! ## Overview
//! [`CacheResource`] wraps a protocol-specific [`CacheEngine`]. The engine
//! turns registered [`CacheTarget`]s into a live [`CacheBackend`] when the
//! resource opens. Lookups report [`Outcome::NotFound`] separately from
//! [`Outcome::Failure`]; a miss is never an error.
//!
//! Invariants:
//! - `is_connected` reports whether any target is registered; it never
//!   contacts a backend.
//! - Text and integer keys are distinct; `"1"` and `1` never collide.
//! - A TTL of [`NO_EXPIRY`] never expires.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;

use crate::dsn;
use crate::error::ResourceError;
use crate::error::UNKNOWN_BACKEND_CODE;
use crate::params::ParamKey;
use crate::params::ParameterSet;
use crate::protocol::Protocol;
use crate::resource::ConnectionResource;
use crate::resource::ResourceCore;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// TTL meaning the entry never expires.
pub const NO_EXPIRY: u32 = 0;

// ============================================================================
// SECTION: Keys and Outcomes
// ============================================================================

/// Cache key; text and integer keys are never coerced into each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheKey {
    /// Text key.
    Text(String),
    /// Integer key.
    Integer(i64),
}

impl CacheKey {
    /// Returns the SHA-256 digest of the key, tagged by kind.
    #[must_use]
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        match self {
            Self::Text(text) => {
                hasher.update(b"s:");
                hasher.update(text.as_bytes());
            }
            Self::Integer(value) => {
                hasher.update(b"n:");
                hasher.update(value.to_be_bytes());
            }
        }
        hasher.finalize().into()
    }

    /// Returns the shard in `0 .. shards` the key is stored on.
    ///
    /// Stable across processes; zero shards map to shard zero.
    #[must_use]
    pub fn shard(&self, shards: usize) -> usize {
        let Ok(count) = u64::try_from(shards) else {
            return 0;
        };
        if count == 0 {
            return 0;
        }
        let digest = self.digest();
        let mut prefix = [0_u8; 8];
        prefix.copy_from_slice(&digest[.. 8]);
        usize::try_from(u64::from_be_bytes(prefix) % count).unwrap_or(0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "\"{text}\""),
            Self::Integer(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for CacheKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for CacheKey {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for CacheKey {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Tri-state result of a cache lookup.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The key was present.
    Success(T),
    /// The key was absent.
    NotFound,
    /// The backend failed.
    Failure(ResourceError),
}

impl<T> Outcome<T> {
    /// Returns true for [`Outcome::Success`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Returns true for [`Outcome::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Returns true for [`Outcome::Failure`].
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    /// Returns the success value, if any.
    #[must_use]
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::NotFound | Self::Failure(_) => None,
        }
    }

    /// Maps the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Success(value) => Outcome::Success(f(value)),
            Self::NotFound => Outcome::NotFound,
            Self::Failure(err) => Outcome::Failure(err),
        }
    }

    /// Converts to a result where a miss is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns the failure carried by [`Outcome::Failure`].
    pub fn into_result(self) -> Result<Option<T>, ResourceError> {
        match self {
            Self::Success(value) => Ok(Some(value)),
            Self::NotFound => Ok(None),
            Self::Failure(err) => Err(err),
        }
    }
}

impl<T> From<Result<Option<T>, ResourceError>> for Outcome<T> {
    fn from(value: Result<Option<T>, ResourceError>) -> Self {
        match value {
            Ok(Some(value)) => Self::Success(value),
            Ok(None) => Self::NotFound,
            Err(err) => Self::Failure(err),
        }
    }
}

// ============================================================================
// SECTION: Targets
// ============================================================================

/// Cache server address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheTarget {
    /// TCP host; engines apply their default port when none is given.
    Tcp {
        /// Host name or address.
        host: String,
        /// Explicit port.
        port: Option<u16>,
    },
    /// Local socket or file path.
    Socket(PathBuf),
}

impl CacheTarget {
    /// Derives the target named by connection parameters.
    ///
    /// A socket path wins over host and port.
    #[must_use]
    pub fn from_params(params: &ParameterSet) -> Option<Self> {
        if let Some(socket) = params.text(ParamKey::Socket) {
            return Some(Self::Socket(PathBuf::from(socket)));
        }
        params.text(ParamKey::Host).map(|host| Self::Tcp {
            host: host.to_string(),
            port: params.port(),
        })
    }
}

impl FromStr for CacheTarget {
    type Err = ResourceError;

    /// Parses `host`, `host:port`, `[v6]:port`, or an absolute socket path.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ResourceError::configuration("cache target is empty"));
        }
        if text.starts_with('/') {
            return Ok(Self::Socket(PathBuf::from(text)));
        }
        let (host, port) = match text.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') || host.ends_with(']') => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ResourceError::configuration(format!("invalid port in cache target {text}")))?;
                (host, Some(port))
            }
            _ => (text, None),
        };
        if host.is_empty() {
            return Err(ResourceError::configuration(format!("cache target {text} has no host")));
        }
        Ok(Self::Tcp {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for CacheTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp {
                host,
                port: Some(port),
            } => write!(f, "{host}:{port}"),
            Self::Tcp {
                host,
                port: None,
            } => f.write_str(host),
            Self::Socket(path) => write!(f, "{}", path.display()),
        }
    }
}

// ============================================================================
// SECTION: Engine Contract
// ============================================================================

/// Live cache connection produced by a [`CacheEngine`].
pub trait CacheBackend: Send + Sync {
    /// Stores a value.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Cache`] when the backend rejects the write.
    fn set(&self, key: &CacheKey, value: &[u8], ttl: u32) -> Result<(), ResourceError>;

    /// Fetches a value.
    fn get(&self, key: &CacheKey) -> Outcome<Vec<u8>>;

    /// Deletes a value.
    fn delete(&self, key: &CacheKey) -> Outcome<()>;

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Cache`] when the backend rejects the flush.
    fn flush(&self) -> Result<(), ResourceError>;

    /// Returns the number of live entries.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Cache`] when the backend cannot report it.
    fn item_count(&self) -> Result<u64, ResourceError>;

    /// Returns backend statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Cache`] when the backend cannot report them.
    fn stats(&self) -> Result<Value, ResourceError>;
}

impl fmt::Debug for dyn CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheBackend").finish_non_exhaustive()
    }
}

/// Connector for one cache protocol.
pub trait CacheEngine: Send + Sync {
    /// Protocol served by this engine.
    fn protocol(&self) -> Protocol;

    /// Checks targets and parameters before any backend call.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when the engine cannot use
    /// the targets.
    fn validate(&self, _targets: &[CacheTarget], _params: &ParameterSet) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Connects to the targets.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend refuses.
    fn connect(
        &self,
        targets: &[CacheTarget],
        params: &ParameterSet,
    ) -> Result<Box<dyn CacheBackend>, ResourceError>;
}

impl fmt::Debug for dyn CacheEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEngine")
            .field("protocol", &self.protocol())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SECTION: Cache Resource
// ============================================================================

/// Connection resource fronting a key/value cache.
pub struct CacheResource {
    /// Protocol engine.
    engine: Arc<dyn CacheEngine>,
    /// Lifecycle state.
    core: ResourceCore<Box<dyn CacheBackend>>,
    /// Targets registered through [`CacheResource::add_target`].
    added: Mutex<Vec<CacheTarget>>,
    /// Target list derived lazily from parameters and added targets.
    targets: Mutex<Option<Vec<CacheTarget>>>,
}

impl CacheResource {
    /// Creates a closed cache resource with no parameters.
    #[must_use]
    pub fn new(engine: Arc<dyn CacheEngine>) -> Self {
        Self::with_params(engine, ParameterSet::new())
    }

    /// Creates a closed cache resource with parameters.
    #[must_use]
    pub const fn with_params(engine: Arc<dyn CacheEngine>, params: ParameterSet) -> Self {
        Self {
            engine,
            core: ResourceCore::new(params),
            added: Mutex::new(Vec::new()),
            targets: Mutex::new(None),
        }
    }

    /// Creates a closed cache resource from a DSN.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::MalformedDsn`] when the DSN cannot be parsed.
    pub fn from_dsn(engine: Arc<dyn CacheEngine>, dsn: &str) -> Result<Self, ResourceError> {
        Ok(Self::with_params(engine, dsn::parse(dsn)?))
    }

    /// Returns the protocol of the underlying engine.
    #[must_use]
    pub fn protocol(&self) -> Protocol {
        self.engine.protocol()
    }

    /// Returns the registered targets: the parameter-derived target first,
    /// then added targets in registration order.
    #[must_use]
    pub fn targets(&self) -> Vec<CacheTarget> {
        let mut guard = self.targets.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(targets) = guard.as_ref() {
            return targets.clone();
        }
        let mut targets: Vec<CacheTarget> =
            CacheTarget::from_params(&self.core.params()).into_iter().collect();
        for target in self.added.lock().unwrap_or_else(PoisonError::into_inner).iter() {
            if !targets.contains(target) {
                targets.push(target.clone());
            }
        }
        *guard = Some(targets.clone());
        targets
    }

    /// Returns true when at least one target is registered.
    ///
    /// Never contacts the backend.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.targets().is_empty()
    }

    /// Registers a target without contacting it.
    ///
    /// An open handle is released so the next operation connects to the new
    /// target list.
    pub fn add_target(&self, target: CacheTarget) {
        self.added.lock().unwrap_or_else(PoisonError::into_inner).push(target);
        self.invalidate_targets();
        drop(self.core.take_handle());
    }

    /// Stores `value` under `key`; a `ttl` of [`NO_EXPIRY`] never expires.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when the cache cannot be opened or rejects
    /// the write.
    pub fn set(&self, key: &CacheKey, value: &[u8], ttl: u32) -> Result<(), ResourceError> {
        self.open()?.set(key, value, ttl)
    }

    /// Fetches the value stored under `key`.
    pub fn get(&self, key: &CacheKey) -> Outcome<Vec<u8>> {
        match self.open() {
            Ok(backend) => backend.get(key),
            Err(err) => Outcome::Failure(err),
        }
    }

    /// Deletes the value stored under `key`.
    pub fn delete(&self, key: &CacheKey) -> Outcome<()> {
        match self.open() {
            Ok(backend) => backend.delete(key),
            Err(err) => Outcome::Failure(err),
        }
    }

    /// Removes every entry.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when the cache cannot be opened or rejects
    /// the flush.
    pub fn flush(&self) -> Result<(), ResourceError> {
        self.open()?.flush()
    }

    /// Returns the number of live entries across all targets.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when the cache cannot be opened or queried.
    pub fn item_count(&self) -> Result<u64, ResourceError> {
        self.open()?.item_count()
    }

    /// Returns backend statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when the cache cannot be opened or queried.
    pub fn stats(&self) -> Result<Value, ResourceError> {
        self.open()?.stats()
    }

    /// Stores a JSON-serialized value.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Cache`] when serialization fails, otherwise
    /// as [`CacheResource::set`].
    pub fn set_json<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: u32) -> Result<(), ResourceError> {
        let bytes = serde_json::to_vec(value)
            .map_err(|err| ResourceError::cache(UNKNOWN_BACKEND_CODE, format!("encode {key}: {err}")))?;
        self.set(key, &bytes, ttl)
    }

    /// Fetches and deserializes a JSON value.
    pub fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Outcome<T> {
        match self.get(key) {
            Outcome::Success(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Outcome::Success(value),
                Err(err) => Outcome::Failure(ResourceError::cache(
                    UNKNOWN_BACKEND_CODE,
                    format!("decode {key}: {err}"),
                )),
            },
            Outcome::NotFound => Outcome::NotFound,
            Outcome::Failure(err) => Outcome::Failure(err),
        }
    }

    /// Drops the derived target list.
    fn invalidate_targets(&self) {
        *self.targets.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl ConnectionResource for CacheResource {
    type Handle = Box<dyn CacheBackend>;

    const TIER: &'static str = "cache";

    fn core(&self) -> &ResourceCore<Box<dyn CacheBackend>> {
        &self.core
    }

    fn validate(&self, params: &ParameterSet) -> Result<(), ResourceError> {
        if let Some(scheme) = params.text(ParamKey::Protocol) {
            let expected = self.engine.protocol();
            if Protocol::from_scheme(scheme) != Some(expected) {
                return Err(ResourceError::configuration(format!(
                    "protocol {scheme} does not match {expected} cache engine"
                )));
            }
        }
        let targets = self.targets();
        if targets.is_empty() {
            return Err(ResourceError::configuration("cache resource has no targets"));
        }
        self.engine.validate(&targets, params)
    }

    fn connect(&self, params: &ParameterSet) -> Result<Box<dyn CacheBackend>, ResourceError> {
        self.engine.connect(&self.targets(), params)
    }

    fn on_params_changed(&self, key: Option<ParamKey>) {
        let routing = key.is_none_or(|key| key == ParamKey::Socket || key.is_routing());
        if routing {
            self.invalidate_targets();
        }
    }
}

impl fmt::Debug for CacheResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheResource")
            .field("protocol", &self.engine.protocol())
            .field("open", &self.core.is_open())
            .finish_non_exhaustive()
    }
}
