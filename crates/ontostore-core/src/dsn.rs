// crates/ontostore-core/src/dsn.rs
// ============================================================================
// Module: Ontostore DSN Codec
// Description: Bidirectional translation between DSN strings and parameters.
// Purpose: Decompose connection URLs and rebuild canonical DSN strings.
// Dependencies: percent-encoding, url, tracing
// ============================================================================

//! ## Overview
//! DSN strings follow
//! `<protocol>://[<user>[:<pass>]@]<host>[:<port>][/<path>][?<query>][#<fragment>]`
//! or are bare filesystem paths naming a local socket. [`parse`] decomposes a
//! DSN into a [`ParameterSet`]; [`build`] renders one back deterministically.
//!
//! Each protocol may install a [`DsnDialect`] that sees every component
//! before the default translation runs, and every parameter before the
//! default rendering runs.
//!
//! Invariants:
//! - `parse(&build(&p)) == p` for every `p` produced by [`parse`].
//! - A relative `Socket` can only be rendered as a bare path. [`build`] is
//!   lossy for such sets: protocol, options and persistent id are dropped.
//!   [`parse`] never produces this combination.
//! - Components are translated path-first; once `Socket` is set the routing
//!   components (host, port, user, password) are ignored in both directions.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::borrow::Cow;
use std::collections::BTreeMap;

use percent_encoding::AsciiSet;
use percent_encoding::CONTROLS;
use percent_encoding::percent_decode_str;
use percent_encoding::utf8_percent_encode;
use tracing::debug;
use url::ParseError;
use url::Url;
use url::form_urlencoded;

use crate::error::ResourceError;
use crate::params::ParamKey;
use crate::params::ParamValue;
use crate::params::ParameterSet;
use crate::protocol::Protocol;

// ============================================================================
// SECTION: Encoding Sets
// ============================================================================

/// Characters escaped inside the user and password components.
const USERINFO: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b':')
    .add(b';')
    .add(b'<')
    .add(b'=')
    .add(b'>')
    .add(b'?')
    .add(b'@')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Characters escaped inside the path component.
const PATH: &AsciiSet =
    &CONTROLS.add(b' ').add(b'"').add(b'#').add(b'%').add(b'<').add(b'>').add(b'?').add(b'`').add(b'{').add(b'}');

/// Characters escaped inside the fragment component.
const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'#').add(b'%').add(b'<').add(b'>').add(b'`');

// ============================================================================
// SECTION: Dialect Hooks
// ============================================================================

/// A decoded DSN component offered to a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnComponent<'a> {
    /// Percent-decoded path.
    Path(&'a str),
    /// Percent-decoded fragment.
    Fragment(&'a str),
    /// Decoded query pair.
    Query(&'a str, &'a str),
    /// Host, verbatim.
    Host(&'a str),
    /// Explicit port.
    Port(u16),
    /// Percent-decoded user name.
    User(&'a str),
    /// Percent-decoded password.
    Password(&'a str),
}

/// Result of offering a component or parameter to a dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// The dialect consumed the item; default translation is skipped.
    Handled,
    /// The default translation applies.
    Fallthrough,
}

/// Unrendered DSN components assembled by [`build_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DsnParts {
    /// URL scheme.
    pub scheme: Option<String>,
    /// User name, unescaped.
    pub user: Option<String>,
    /// Password, unescaped.
    pub password: Option<String>,
    /// Host, verbatim.
    pub host: Option<String>,
    /// Explicit port.
    pub port: Option<u16>,
    /// Socket path, unescaped.
    pub path: Option<String>,
    /// Query pairs in render order.
    pub query: Vec<(String, String)>,
    /// Fragment, unescaped.
    pub fragment: Option<String>,
}

impl DsnParts {
    /// Renders the parts as a DSN string.
    ///
    /// A path without a scheme, or a relative path, renders as a bare socket
    /// path. Parts without a scheme or path render as an empty string.
    ///
    /// A relative path with a scheme loses the scheme, query, and fragment;
    /// the drop is logged at debug level.
    #[must_use]
    pub fn render(&self) -> String {
        let Some(scheme) = &self.scheme else {
            return self.path.clone().unwrap_or_default();
        };
        if let Some(path) = &self.path
            && !path.starts_with('/')
        {
            debug!(
                scheme = %scheme,
                options = self.query.len(),
                fragment = self.fragment.is_some(),
                "relative socket path renders without scheme; components dropped"
            );
            return path.clone();
        }
        let mut out = format!("{scheme}://");
        if self.user.is_some() || self.password.is_some() {
            if let Some(user) = &self.user {
                out.extend(utf8_percent_encode(user, USERINFO));
            }
            if let Some(password) = &self.password {
                out.push(':');
                out.extend(utf8_percent_encode(password, USERINFO));
            }
            out.push('@');
        }
        if let Some(host) = &self.host {
            out.push_str(host);
        }
        if let Some(port) = self.port {
            out.push(':');
            out.push_str(&port.to_string());
        }
        if let Some(path) = &self.path {
            out.extend(utf8_percent_encode(path, PATH));
        }
        if !self.query.is_empty() {
            let mut serializer = form_urlencoded::Serializer::new(String::new());
            for (key, value) in &self.query {
                serializer.append_pair(key, value);
            }
            out.push('?');
            out.push_str(&serializer.finish());
        }
        if let Some(fragment) = &self.fragment {
            out.push('#');
            out.extend(utf8_percent_encode(fragment, FRAGMENT));
        }
        out
    }
}

/// Protocol-specific DSN translation hooks.
///
/// Both hooks run before the default translation. Returning
/// [`Translation::Handled`] suppresses the default for that item.
pub trait DsnDialect: Send + Sync {
    /// Offers a decoded component before default translation.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError`] when the dialect rejects the component.
    fn decode(
        &self,
        _component: &DsnComponent<'_>,
        _params: &mut ParameterSet,
    ) -> Result<Translation, ResourceError> {
        Ok(Translation::Fallthrough)
    }

    /// Offers a parameter before default rendering.
    fn encode(&self, _key: ParamKey, _value: &ParamValue, _parts: &mut DsnParts) -> Translation {
        Translation::Fallthrough
    }
}

/// Dialect applying only the default translation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect;

impl DsnDialect for StandardDialect {}

/// Dialect for document stores.
///
/// Claims the `database` and `collection` query keys for the
/// [`ParamKey::Database`] and [`ParamKey::Collection`] parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentDialect;

/// Query key carrying the database name.
const DATABASE_QUERY_KEY: &str = "database";
/// Query key carrying the collection name.
const COLLECTION_QUERY_KEY: &str = "collection";

impl DsnDialect for DocumentDialect {
    fn decode(
        &self,
        component: &DsnComponent<'_>,
        params: &mut ParameterSet,
    ) -> Result<Translation, ResourceError> {
        let DsnComponent::Query(key, value) = component else {
            return Ok(Translation::Fallthrough);
        };
        let target = match *key {
            DATABASE_QUERY_KEY => ParamKey::Database,
            COLLECTION_QUERY_KEY => ParamKey::Collection,
            _ => return Ok(Translation::Fallthrough),
        };
        params.insert(target, *value)?;
        Ok(Translation::Handled)
    }

    fn encode(&self, key: ParamKey, value: &ParamValue, parts: &mut DsnParts) -> Translation {
        let query_key = match key {
            ParamKey::Database => DATABASE_QUERY_KEY,
            ParamKey::Collection => COLLECTION_QUERY_KEY,
            _ => return Translation::Fallthrough,
        };
        let Some(text) = value.as_text() else {
            return Translation::Fallthrough;
        };
        parts.query.push((query_key.to_string(), text.to_string()));
        Translation::Handled
    }
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses a DSN using the dialect of its scheme.
///
/// # Errors
///
/// Returns [`ResourceError::MalformedDsn`] when the string cannot be
/// decomposed into DSN components.
pub fn parse(dsn: &str) -> Result<ParameterSet, ResourceError> {
    let dialect = dsn
        .split_once("://")
        .and_then(|(scheme, _)| Protocol::from_scheme(scheme.trim()))
        .map_or(&StandardDialect as &dyn DsnDialect, Protocol::dialect);
    parse_with(dsn, dialect)
}

/// Parses a DSN with an explicit dialect.
///
/// # Errors
///
/// Returns [`ResourceError::MalformedDsn`] when the string cannot be
/// decomposed into DSN components.
pub fn parse_with(dsn: &str, dialect: &dyn DsnDialect) -> Result<ParameterSet, ResourceError> {
    if dsn.trim().is_empty() {
        return Err(ResourceError::MalformedDsn("empty dsn".to_string()));
    }
    match Url::parse(dsn) {
        Ok(url) => {
            let has_authority =
                dsn.split_once(':').is_some_and(|(_, rest)| rest.starts_with("//"));
            if !has_authority {
                return Err(ResourceError::MalformedDsn(format!(
                    "dsn for scheme {} has no authority section",
                    url.scheme()
                )));
            }
            decode_url(&url, dialect)
        }
        Err(ParseError::RelativeUrlWithoutBase) if !dsn.contains("://") => {
            let mut params = ParameterSet::new();
            params.insert(ParamKey::Socket, dsn)?;
            Ok(params)
        }
        Err(err) => Err(ResourceError::MalformedDsn(err.to_string())),
    }
}

/// Translates the components of a parsed URL, path first.
fn decode_url(url: &Url, dialect: &dyn DsnDialect) -> Result<ParameterSet, ResourceError> {
    let mut params = ParameterSet::new();
    params.insert(ParamKey::Protocol, url.scheme())?;

    let path = percent_decode(url.path(), "path")?;
    if !path.is_empty() && path != "/" {
        translate(dialect, DsnComponent::Path(&path), &mut params)?;
    }
    if let Some(raw) = url.fragment() {
        let fragment = percent_decode(raw, "fragment")?;
        if !fragment.is_empty() {
            translate(dialect, DsnComponent::Fragment(&fragment), &mut params)?;
        }
    }
    for (key, value) in url.query_pairs() {
        translate(dialect, DsnComponent::Query(&key, &value), &mut params)?;
    }
    if let Some(host) = url.host_str().filter(|host| !host.is_empty()) {
        translate(dialect, DsnComponent::Host(host), &mut params)?;
    }
    if let Some(port) = url.port() {
        translate(dialect, DsnComponent::Port(port), &mut params)?;
    }
    let user = percent_decode(url.username(), "user")?;
    if !user.is_empty() {
        translate(dialect, DsnComponent::User(&user), &mut params)?;
    }
    if let Some(raw) = url.password() {
        let password = percent_decode(raw, "password")?;
        if !password.is_empty() {
            translate(dialect, DsnComponent::Password(&password), &mut params)?;
        }
    }
    Ok(params)
}

/// Offers a component to the dialect, then applies the default translation.
fn translate(
    dialect: &dyn DsnDialect,
    component: DsnComponent<'_>,
    params: &mut ParameterSet,
) -> Result<(), ResourceError> {
    if dialect.decode(&component, params)? == Translation::Handled {
        return Ok(());
    }
    let routed = match component {
        DsnComponent::Path(path) => (ParamKey::Socket, ParamValue::from(path)),
        DsnComponent::Fragment(fragment) => (ParamKey::PersistentId, ParamValue::from(fragment)),
        DsnComponent::Query(key, value) => {
            params.set_option(key, value);
            return Ok(());
        }
        DsnComponent::Host(host) => (ParamKey::Host, ParamValue::from(host)),
        DsnComponent::Port(port) => (ParamKey::Port, ParamValue::from(port)),
        DsnComponent::User(user) => (ParamKey::User, ParamValue::from(user)),
        DsnComponent::Password(password) => (ParamKey::Password, ParamValue::from(password)),
    };
    let (key, value) = routed;
    if key.is_routing() && params.contains(ParamKey::Socket) {
        debug!(key = %key, "socket path present; ignoring routing component");
        return Ok(());
    }
    params.insert(key, value)?;
    Ok(())
}

/// Percent-decodes a component into UTF-8.
fn percent_decode(raw: &str, component: &str) -> Result<String, ResourceError> {
    percent_decode_str(raw).decode_utf8().map(Cow::into_owned).map_err(|err| {
        ResourceError::MalformedDsn(format!("{component} is not valid utf-8: {err}"))
    })
}

// ============================================================================
// SECTION: Building
// ============================================================================

/// Builds a DSN using the dialect of the parameter set's protocol.
///
/// Lossy when `params` pairs a protocol with a relative socket path: the
/// result is the bare path (see [`DsnParts::render`]).
#[must_use]
pub fn build(params: &ParameterSet) -> String {
    let dialect = params
        .text(ParamKey::Protocol)
        .and_then(Protocol::from_scheme)
        .map_or(&StandardDialect as &dyn DsnDialect, Protocol::dialect);
    build_with(params, dialect)
}

/// Builds a DSN with an explicit dialect.
#[must_use]
pub fn build_with(params: &ParameterSet, dialect: &dyn DsnDialect) -> String {
    let has_socket = params.contains(ParamKey::Socket);
    let mut parts = DsnParts::default();
    for (key, value) in params.iter() {
        if dialect.encode(key, value, &mut parts) == Translation::Handled {
            continue;
        }
        if key.is_routing() && has_socket {
            continue;
        }
        match (key, value) {
            (ParamKey::Protocol, ParamValue::Text(text)) => parts.scheme = Some(text.clone()),
            (ParamKey::Socket, ParamValue::Text(text)) => parts.path = Some(text.clone()),
            (ParamKey::Host, ParamValue::Text(text)) => parts.host = Some(text.clone()),
            (ParamKey::Port, ParamValue::Port(port)) => parts.port = Some(*port),
            (ParamKey::User, ParamValue::Text(text)) => parts.user = Some(text.clone()),
            (ParamKey::Password, ParamValue::Text(text)) => parts.password = Some(text.clone()),
            (ParamKey::PersistentId, ParamValue::Text(text)) => parts.fragment = Some(text.clone()),
            (ParamKey::Options, ParamValue::Options(options)) => append_options(&mut parts, options),
            _ => debug!(key = %key, "parameter has no dsn representation; omitted"),
        }
    }
    parts.render()
}

/// Appends option pairs in key order.
fn append_options(parts: &mut DsnParts, options: &BTreeMap<String, String>) {
    parts.query.extend(options.iter().map(|(key, value)| (key.clone(), value.clone())));
}
