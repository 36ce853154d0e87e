// crates/ontostore-core/src/params.rs
// ============================================================================
// Module: Ontostore Connection Parameters
// Description: Typed connection parameter vocabulary and parameter sets.
// Purpose: Hold the routing and option values a resource connects with.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`ParameterSet`] maps the fixed [`ParamKey`] vocabulary to typed
//! [`ParamValue`]s. Each key accepts exactly one value kind; mismatches are
//! rejected at insertion time so resources never see an ill-typed port or
//! option bag.
//! Invariants:
//! - Keys are unique; ordering does not participate in equality.
//! - `Socket` is exclusive with the routing keys when a DSN is derived.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use crate::error::ResourceError;

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Connection parameter vocabulary.
///
/// # Invariants
/// - Declaration order is the canonical translation order used by the DSN
///   codec: `Socket` precedes the routing keys it excludes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    /// Protocol (DSN scheme).
    Protocol,
    /// Local socket or file path.
    Socket,
    /// Host name or address.
    Host,
    /// TCP port.
    Port,
    /// User name.
    User,
    /// Password.
    Password,
    /// Database name.
    Database,
    /// Collection name.
    Collection,
    /// Persistent session identifier.
    PersistentId,
    /// Opaque backend options.
    Options,
}

impl ParamKey {
    /// Every key, in canonical translation order.
    pub const ALL: [Self; 10] = [
        Self::Protocol,
        Self::Socket,
        Self::Host,
        Self::Port,
        Self::User,
        Self::Password,
        Self::Database,
        Self::Collection,
        Self::PersistentId,
        Self::Options,
    ];

    /// Returns the value kind accepted by the key.
    #[must_use]
    pub const fn kind(self) -> ParamKind {
        match self {
            Self::Port => ParamKind::Port,
            Self::Options => ParamKind::Options,
            Self::Protocol
            | Self::Socket
            | Self::Host
            | Self::User
            | Self::Password
            | Self::Database
            | Self::Collection
            | Self::PersistentId => ParamKind::Text,
        }
    }

    /// Returns true for keys a socket path makes redundant.
    #[must_use]
    pub const fn is_routing(self) -> bool {
        matches!(self, Self::Host | Self::Port | Self::User | Self::Password)
    }

    /// Returns a stable label for messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Protocol => "protocol",
            Self::Socket => "socket",
            Self::Host => "host",
            Self::Port => "port",
            Self::User => "user",
            Self::Password => "password",
            Self::Database => "database",
            Self::Collection => "collection",
            Self::PersistentId => "persistent_id",
            Self::Options => "options",
        }
    }
}

impl fmt::Display for ParamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Value kind accepted by a parameter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// UTF-8 text.
    Text,
    /// TCP port number.
    Port,
    /// String-to-string option map.
    Options,
}

impl ParamKind {
    /// Returns a stable label for messages.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Port => "port",
            Self::Options => "options",
        }
    }
}

// ============================================================================
// SECTION: Values
// ============================================================================

/// Typed parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// UTF-8 text value.
    Text(String),
    /// TCP port number.
    Port(u16),
    /// Option bag; values are always strings.
    Options(BTreeMap<String, String>),
}

impl ParamValue {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> ParamKind {
        match self {
            Self::Text(_) => ParamKind::Text,
            Self::Port(_) => ParamKind::Port,
            Self::Options(_) => ParamKind::Options,
        }
    }

    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Port(_) | Self::Options(_) => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<u16> for ParamValue {
    fn from(value: u16) -> Self {
        Self::Port(value)
    }
}

impl From<BTreeMap<String, String>> for ParamValue {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self::Options(value)
    }
}

// ============================================================================
// SECTION: Parameter Set
// ============================================================================

/// Connection parameter set keyed by [`ParamKey`].
///
/// # Invariants
/// - Every stored value matches [`ParamKey::kind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ParameterSet {
    /// Stored parameter values.
    values: BTreeMap<ParamKey, ParamValue>,
}

impl ParameterSet {
    /// Creates an empty parameter set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            values: BTreeMap::new(),
        }
    }

    /// Inserts a value, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when the value kind does not
    /// match the key.
    pub fn insert(
        &mut self,
        key: ParamKey,
        value: impl Into<ParamValue>,
    ) -> Result<Option<ParamValue>, ResourceError> {
        let value = value.into();
        if value.kind() != key.kind() {
            return Err(ResourceError::configuration(format!(
                "parameter {key} expects a {} value, got {}",
                key.kind().label(),
                value.kind().label()
            )));
        }
        Ok(self.values.insert(key, value))
    }

    /// Builder-style insert.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when the value kind does not
    /// match the key.
    pub fn with(mut self, key: ParamKey, value: impl Into<ParamValue>) -> Result<Self, ResourceError> {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Returns the value for a key.
    #[must_use]
    pub fn get(&self, key: ParamKey) -> Option<&ParamValue> {
        self.values.get(&key)
    }

    /// Returns true when the key is present.
    #[must_use]
    pub fn contains(&self, key: ParamKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Removes a key, returning its value.
    pub fn remove(&mut self, key: ParamKey) -> Option<ParamValue> {
        self.values.remove(&key)
    }

    /// Returns the text value for a key.
    #[must_use]
    pub fn text(&self, key: ParamKey) -> Option<&str> {
        self.values.get(&key).and_then(ParamValue::as_text)
    }

    /// Returns the port, if set.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        match self.values.get(&ParamKey::Port) {
            Some(ParamValue::Port(port)) => Some(*port),
            _ => None,
        }
    }

    /// Returns the option bag, if set.
    #[must_use]
    pub fn options(&self) -> Option<&BTreeMap<String, String>> {
        match self.values.get(&ParamKey::Options) {
            Some(ParamValue::Options(options)) => Some(options),
            _ => None,
        }
    }

    /// Returns a single option value.
    #[must_use]
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options().and_then(|options| options.get(name)).map(String::as_str)
    }

    /// Sets a single option, creating the option bag when absent.
    pub fn set_option(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let entry =
            self.values.entry(ParamKey::Options).or_insert_with(|| ParamValue::Options(BTreeMap::new()));
        if let ParamValue::Options(options) = entry {
            options.insert(name.into(), value.into());
        }
    }

    /// Copies every key from `other` that is absent here.
    pub fn inherit(&mut self, other: &Self) {
        for (key, value) in &other.values {
            self.values.entry(*key).or_insert_with(|| value.clone());
        }
    }

    /// Iterates over entries in canonical key order.
    pub fn iter(&self) -> impl Iterator<Item = (ParamKey, &ParamValue)> {
        self.values.iter().map(|(key, value)| (*key, value))
    }

    /// Returns the number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn insert_rejects_mismatched_kinds() {
        let mut params = ParameterSet::new();
        assert!(params.insert(ParamKey::Port, "11211").is_err());
        assert!(params.insert(ParamKey::Host, 11211_u16).is_err());
        assert!(params.insert(ParamKey::Options, "a=b").is_err());
        assert!(params.is_empty());
    }

    #[test]
    fn typed_accessors_return_values() {
        let params = ParameterSet::new()
            .with(ParamKey::Host, "cache.local")
            .and_then(|p| p.with(ParamKey::Port, 11211_u16))
            .unwrap();
        assert_eq!(params.text(ParamKey::Host), Some("cache.local"));
        assert_eq!(params.port(), Some(11211));
        assert_eq!(params.text(ParamKey::Port), None);
    }

    #[test]
    fn set_option_creates_bag() {
        let mut params = ParameterSet::new();
        params.set_option("io_timeout_ms", "250");
        params.set_option("binary", "0");
        assert_eq!(params.option("io_timeout_ms"), Some("250"));
        assert_eq!(params.options().map(BTreeMap::len), Some(2));
    }

    #[test]
    fn inherit_keeps_existing_values() {
        let mut child = ParameterSet::new().with(ParamKey::Database, "tags").unwrap();
        let parent = ParameterSet::new()
            .with(ParamKey::Database, "other")
            .and_then(|p| p.with(ParamKey::Socket, "/var/data"))
            .unwrap();
        child.inherit(&parent);
        assert_eq!(child.text(ParamKey::Database), Some("tags"));
        assert_eq!(child.text(ParamKey::Socket), Some("/var/data"));
    }

    #[test]
    fn equality_ignores_insertion_order() {
        let left = ParameterSet::new()
            .with(ParamKey::Host, "h")
            .and_then(|p| p.with(ParamKey::User, "u"))
            .unwrap();
        let right = ParameterSet::new()
            .with(ParamKey::User, "u")
            .and_then(|p| p.with(ParamKey::Host, "h"))
            .unwrap();
        assert_eq!(left, right);
    }
}
