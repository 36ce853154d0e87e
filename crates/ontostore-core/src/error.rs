// crates/ontostore-core/src/error.rs
// ============================================================================
// Module: Ontostore Resource Errors
// Description: Error taxonomy shared by DSN parsing, resources, and caches.
// Purpose: Surface every failure as a typed error carrying backend codes.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! [`ResourceError`] is the single failure type for the connection layer.
//! Backend failures always carry the backend's native result code and
//! message. Not-found conditions are never errors; caches report them through
//! [`crate::cache::Outcome::NotFound`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Code used when a backend failure has no native result code.
pub const UNKNOWN_BACKEND_CODE: i64 = -1;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised by the connection and cache layer.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - `Connection` and `Cache` always carry the backend's code and message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// DSN string cannot be decomposed into its components.
    #[error("malformed dsn: {0}")]
    MalformedDsn(String),
    /// Resource is missing a required parameter or parent.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// Backend reported failure while opening, closing, or operating a resource.
    #[error("connection error {code}: {message}")]
    Connection {
        /// Backend-native result code.
        code: i64,
        /// Backend-provided message.
        message: String,
    },
    /// Cache backend rejected an operation.
    #[error("cache error {code}: {message}")]
    Cache {
        /// Backend-native result code.
        code: i64,
        /// Backend-provided message.
        message: String,
    },
}

impl ResourceError {
    /// Builds a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Builds a connection error with a backend code.
    #[must_use]
    pub fn connection(code: i64, message: impl Into<String>) -> Self {
        Self::Connection {
            code,
            message: message.into(),
        }
    }

    /// Builds a cache error with a backend code.
    #[must_use]
    pub fn cache(code: i64, message: impl Into<String>) -> Self {
        Self::Cache {
            code,
            message: message.into(),
        }
    }

    /// Returns the backend code for backend-originated failures.
    #[must_use]
    pub const fn backend_code(&self) -> Option<i64> {
        match self {
            Self::Connection {
                code, ..
            }
            | Self::Cache {
                code, ..
            } => Some(*code),
            Self::MalformedDsn(_) | Self::Configuration(_) => None,
        }
    }

    /// Returns true when the error is a configuration failure.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_expose_codes() {
        assert_eq!(ResourceError::cache(14, "not stored").backend_code(), Some(14));
        assert_eq!(ResourceError::connection(3, "refused").backend_code(), Some(3));
        assert_eq!(ResourceError::configuration("missing host").backend_code(), None);
    }

    #[test]
    fn display_includes_code_and_message() {
        let err = ResourceError::cache(10, "out of memory");
        assert_eq!(err.to_string(), "cache error 10: out of memory");
    }
}
