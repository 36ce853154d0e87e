// crates/ontostore-core/src/protocol.rs
// ============================================================================
// Module: Ontostore Protocols
// Description: Enumerated backend protocols addressed by DSN schemes.
// Purpose: Drive dialect selection and resource construction dispatch.
// Dependencies: crate::dsn, crate::params
// ============================================================================

//! ## Overview
//! [`Protocol`] is the closed set of backends the workspace can construct
//! resources for. Scheme resolution tries an exact match first and then the
//! base scheme before a `+` suffix, so `memcached+tls` resolves to
//! [`Protocol::Memcached`] while `sqlite+cache` keeps its own variant.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use crate::dsn::DocumentDialect;
use crate::dsn::DsnDialect;
use crate::dsn::StandardDialect;
use crate::error::ResourceError;
use crate::params::ParamKey;
use crate::params::ParameterSet;

// ============================================================================
// SECTION: Protocols
// ============================================================================

/// Kind of resource a protocol produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    /// Key/value cache resource.
    Cache,
    /// Document-store server resource.
    Documents,
}

/// Backend protocols addressable by DSN scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Memcached text protocol over TCP or a Unix socket.
    Memcached,
    /// `SQLite` key/value cache table.
    SqliteCache,
    /// `SQLite` document store rooted at a data directory.
    Sqlite,
}

impl Protocol {
    /// Every supported protocol.
    pub const ALL: [Self; 3] = [Self::Memcached, Self::SqliteCache, Self::Sqlite];

    /// Returns the canonical DSN scheme.
    #[must_use]
    pub const fn scheme(self) -> &'static str {
        match self {
            Self::Memcached => "memcached",
            Self::SqliteCache => "sqlite+cache",
            Self::Sqlite => "sqlite",
        }
    }

    /// Resolves a DSN scheme to a protocol.
    #[must_use]
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        let scheme = scheme.to_ascii_lowercase();
        let exact = Self::ALL.into_iter().find(|protocol| protocol.scheme() == scheme);
        if exact.is_some() {
            return exact;
        }
        let (base, _) = scheme.split_once('+')?;
        Self::ALL.into_iter().find(|protocol| protocol.scheme() == base)
    }

    /// Resolves the protocol named by a parameter set.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when the protocol is missing
    /// or not supported.
    pub fn from_params(params: &ParameterSet) -> Result<Self, ResourceError> {
        let scheme = params
            .text(ParamKey::Protocol)
            .ok_or_else(|| ResourceError::configuration("connection parameters name no protocol"))?;
        Self::from_scheme(scheme)
            .ok_or_else(|| ResourceError::configuration(format!("unsupported protocol: {scheme}")))
    }

    /// Returns the kind of resource this protocol produces.
    #[must_use]
    pub const fn kind(self) -> ResourceKind {
        match self {
            Self::Memcached | Self::SqliteCache => ResourceKind::Cache,
            Self::Sqlite => ResourceKind::Documents,
        }
    }

    /// Returns the DSN dialect used to translate this protocol's parameters.
    #[must_use]
    pub fn dialect(self) -> &'static dyn DsnDialect {
        match self {
            Self::Memcached | Self::SqliteCache => &StandardDialect,
            Self::Sqlite => &DocumentDialect,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn schemes_resolve_exactly_first() {
        assert_eq!(Protocol::from_scheme("sqlite+cache"), Some(Protocol::SqliteCache));
        assert_eq!(Protocol::from_scheme("SQLITE"), Some(Protocol::Sqlite));
        assert_eq!(Protocol::from_scheme("memcached"), Some(Protocol::Memcached));
    }

    #[test]
    fn suffixed_schemes_fall_back_to_base() {
        assert_eq!(Protocol::from_scheme("memcached+tls"), Some(Protocol::Memcached));
        assert_eq!(Protocol::from_scheme("redis"), None);
        assert_eq!(Protocol::from_scheme("redis+cache"), None);
    }

    #[test]
    fn from_params_requires_known_protocol() {
        let empty = ParameterSet::new();
        assert!(Protocol::from_params(&empty).unwrap_err().is_configuration());
        let mut params = ParameterSet::new();
        params.insert(ParamKey::Protocol, "mongodb").unwrap();
        assert!(Protocol::from_params(&params).unwrap_err().is_configuration());
    }
}
