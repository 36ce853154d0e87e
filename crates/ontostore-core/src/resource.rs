// crates/ontostore-core/src/resource.rs
// ============================================================================
// Module: Ontostore Connection Resources
// Description: Lazily-opened connection resource contract and shared state.
// Purpose: Give every backend tier the same open/close/parameter lifecycle.
// Dependencies: crate::dsn, crate::params, tracing
// ============================================================================

//! ## Overview
//! A connection resource owns at most one live native handle. It starts
//! closed, opens on the first operation that needs connectivity, and closes
//! only when asked. Implementations supply validation and connect logic; the
//! provided methods of [`ConnectionResource`] run the lifecycle around them.
//!
//! Invariants:
//! - `open` is idempotent and never contacts the backend when validation
//!   fails.
//! - Parameter changes take effect at the next `open`; an open handle is not
//!   re-targeted.
//! - `close` is idempotent and clears state derived from parameters.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tracing::debug;

use crate::dsn;
use crate::error::ResourceError;
use crate::params::ParamKey;
use crate::params::ParamValue;
use crate::params::ParameterSet;

// ============================================================================
// SECTION: Shared State
// ============================================================================

/// State shared by every connection resource.
///
/// # Invariants
/// - At most one handle is installed at a time.
/// - The handle lock is held across connect so concurrent opens connect once.
#[derive(Debug)]
pub struct ResourceCore<H> {
    /// Current connection parameters.
    params: Mutex<ParameterSet>,
    /// DSN rendered from the parameter snapshot it was built for.
    dsn: Mutex<Option<(ParameterSet, String)>>,
    /// Live native handle.
    handle: Mutex<Option<Arc<H>>>,
}

impl<H> Default for ResourceCore<H> {
    fn default() -> Self {
        Self::new(ParameterSet::new())
    }
}

impl<H> ResourceCore<H> {
    /// Creates closed resource state with the given parameters.
    #[must_use]
    pub const fn new(params: ParameterSet) -> Self {
        Self {
            params: Mutex::new(params),
            dsn: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }

    /// Creates closed resource state from a DSN string.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::MalformedDsn`] when the DSN cannot be parsed.
    pub fn from_dsn(dsn: &str) -> Result<Self, ResourceError> {
        Ok(Self::new(dsn::parse(dsn)?))
    }

    /// Returns true when a handle is installed.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    /// Returns the installed handle, if any.
    #[must_use]
    pub fn handle(&self) -> Option<Arc<H>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Returns the installed handle or connects and installs a new one.
    ///
    /// # Errors
    ///
    /// Returns whatever `connect` returns; nothing is installed on failure.
    pub fn open_with(
        &self,
        connect: impl FnOnce(&ParameterSet) -> Result<H, ResourceError>,
    ) -> Result<Arc<H>, ResourceError> {
        let mut guard = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = guard.as_ref() {
            return Ok(Arc::clone(handle));
        }
        let params = self.params();
        let handle = Arc::new(connect(&params)?);
        *guard = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Removes and returns the installed handle.
    pub fn take_handle(&self) -> Option<Arc<H>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Returns a snapshot of the parameters.
    #[must_use]
    pub fn params(&self) -> ParameterSet {
        self.params.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Mutates the parameters in place.
    pub fn update_params<R>(&self, update: impl FnOnce(&mut ParameterSet) -> R) -> R {
        let mut guard = self.params.lock().unwrap_or_else(PoisonError::into_inner);
        update(&mut guard)
    }

    /// Returns the DSN for `params`, reusing the cached rendering when the
    /// parameters are unchanged.
    pub fn cached_dsn(&self, params: ParameterSet, render: impl FnOnce(&ParameterSet) -> String) -> String {
        let mut guard = self.dsn.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_for, dsn)) = guard.as_ref()
            && *cached_for == params
        {
            return dsn.clone();
        }
        let dsn = render(&params);
        *guard = Some((params, dsn.clone()));
        dsn
    }

    /// Drops the cached DSN.
    pub fn invalidate_dsn(&self) {
        *self.dsn.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

// ============================================================================
// SECTION: Resource Contract
// ============================================================================

/// Lazily-opened connection resource.
///
/// Implementors provide [`ConnectionResource::core`],
/// [`ConnectionResource::connect`], and optionally validation and lifecycle
/// hooks. Callers use the provided methods.
pub trait ConnectionResource: Send + Sync {
    /// Native handle type.
    type Handle: Send + Sync;

    /// Tier name used in logs.
    const TIER: &'static str;

    /// Returns the shared resource state.
    fn core(&self) -> &ResourceCore<Self::Handle>;

    /// Checks required parameters before any backend call.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when the resource cannot be
    /// opened with `params`.
    fn validate(&self, _params: &ParameterSet) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Establishes a native handle, opening any parent tier first.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend refuses.
    fn connect(&self, params: &ParameterSet) -> Result<Self::Handle, ResourceError>;

    /// Releases a native handle.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend reports failure.
    fn disconnect(&self, _handle: Arc<Self::Handle>) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Drops state derived from parameters. `None` means every key.
    fn on_params_changed(&self, _key: Option<ParamKey>) {}

    /// Returns the parameters a DSN is rendered from.
    fn dsn_params(&self) -> ParameterSet {
        self.core().params()
    }

    /// Returns true when a native handle is installed.
    fn is_open(&self) -> bool {
        self.core().is_open()
    }

    /// Opens the resource, returning the native handle.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when validation fails and
    /// [`ResourceError::Connection`] when the backend refuses.
    fn open(&self) -> Result<Arc<Self::Handle>, ResourceError> {
        self.core().open_with(|params| {
            self.validate(params)?;
            let handle = self.connect(params)?;
            debug!(tier = Self::TIER, "resource opened");
            Ok(handle)
        })
    }

    /// Closes the resource. Closing a closed resource is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Connection`] when the backend reports failure
    /// while releasing the handle; the handle is dropped regardless.
    fn close(&self) -> Result<(), ResourceError> {
        let handle = self.core().take_handle();
        self.core().invalidate_dsn();
        self.on_params_changed(None);
        match handle {
            Some(handle) => {
                debug!(tier = Self::TIER, "resource closed");
                self.disconnect(handle)
            }
            None => Ok(()),
        }
    }

    /// Returns a parameter value.
    fn param(&self, key: ParamKey) -> Option<ParamValue> {
        self.core().update_params(|params| params.get(key).cloned())
    }

    /// Returns true when a parameter is set.
    fn has_param(&self, key: ParamKey) -> bool {
        self.core().update_params(|params| params.contains(key))
    }

    /// Sets a parameter, returning the previous value.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Configuration`] when the value kind does not
    /// match the key.
    fn set_param(&self, key: ParamKey, value: ParamValue) -> Result<Option<ParamValue>, ResourceError> {
        let previous = self.core().update_params(|params| params.insert(key, value))?;
        self.core().invalidate_dsn();
        self.on_params_changed(Some(key));
        Ok(previous)
    }

    /// Removes a parameter, returning its value.
    fn remove_param(&self, key: ParamKey) -> Option<ParamValue> {
        let previous = self.core().update_params(|params| params.remove(key));
        self.core().invalidate_dsn();
        self.on_params_changed(Some(key));
        previous
    }

    /// Returns a snapshot of the resource's own parameters.
    fn params(&self) -> ParameterSet {
        self.core().params()
    }

    /// Returns the DSN describing this resource.
    fn dsn(&self) -> String {
        self.core().cached_dsn(self.dsn_params(), dsn::build)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;

    struct Probe {
        core: ResourceCore<String>,
        connects: AtomicUsize,
        changes: AtomicUsize,
    }

    impl Probe {
        fn new(params: ParameterSet) -> Self {
            Self {
                core: ResourceCore::new(params),
                connects: AtomicUsize::new(0),
                changes: AtomicUsize::new(0),
            }
        }
    }

    impl ConnectionResource for Probe {
        type Handle = String;

        const TIER: &'static str = "probe";

        fn core(&self) -> &ResourceCore<String> {
            &self.core
        }

        fn validate(&self, params: &ParameterSet) -> Result<(), ResourceError> {
            if params.contains(ParamKey::Host) {
                Ok(())
            } else {
                Err(ResourceError::configuration("probe needs a host"))
            }
        }

        fn connect(&self, params: &ParameterSet) -> Result<String, ResourceError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(params.text(ParamKey::Host).unwrap_or_default().to_string())
        }

        fn on_params_changed(&self, _key: Option<ParamKey>) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn open_is_idempotent() {
        let probe = Probe::new(ParameterSet::new().with(ParamKey::Host, "a").unwrap());
        assert!(!probe.is_open());
        let first = probe.open().unwrap();
        let second = probe.open().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(probe.connects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn validation_failure_skips_connect() {
        let probe = Probe::new(ParameterSet::new());
        assert!(probe.open().unwrap_err().is_configuration());
        assert_eq!(probe.connects.load(Ordering::SeqCst), 0);
        assert!(!probe.is_open());
    }

    #[test]
    fn param_changes_apply_at_next_open() {
        let probe = Probe::new(ParameterSet::new().with(ParamKey::Host, "a").unwrap());
        assert_eq!(probe.open().unwrap().as_str(), "a");
        probe.set_param(ParamKey::Host, ParamValue::from("b")).unwrap();
        assert_eq!(probe.open().unwrap().as_str(), "a");
        probe.close().unwrap();
        assert_eq!(probe.open().unwrap().as_str(), "b");
        assert_eq!(probe.changes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn close_is_idempotent() {
        let probe = Probe::new(ParameterSet::new().with(ParamKey::Host, "a").unwrap());
        probe.close().unwrap();
        probe.open().unwrap();
        probe.close().unwrap();
        probe.close().unwrap();
        assert!(!probe.is_open());
    }

    #[test]
    fn dsn_tracks_parameter_changes() {
        let probe = Probe::new(crate::dsn::parse("memcached://a:11211").unwrap());
        assert_eq!(probe.dsn(), "memcached://a:11211");
        probe.remove_param(ParamKey::Port);
        assert_eq!(probe.dsn(), "memcached://a");
        assert!(!probe.has_param(ParamKey::Port));
        assert_eq!(probe.param(ParamKey::Host), Some(ParamValue::from("a")));
    }
}
