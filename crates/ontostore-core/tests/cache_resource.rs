//! Cache resource integration tests.
//!
//! ## Purpose
//! These tests drive [`CacheResource`] through an in-memory engine to check
//! target registration, lazy opening, and tri-state lookup outcomes.
// crates/ontostore-core/tests/cache_resource.rs
// ============================================================================
// Module: Cache Resource Tests
// Description: Lifecycle and outcome checks for the cache resource.
// Purpose: Validate cache semantics independent of any network backend.
// ============================================================================

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use ontostore_core::CacheBackend;
use ontostore_core::CacheEngine;
use ontostore_core::CacheKey;
use ontostore_core::CacheResource;
use ontostore_core::CacheTarget;
use ontostore_core::ConnectionResource;
use ontostore_core::NO_EXPIRY;
use ontostore_core::Outcome;
use ontostore_core::ParamKey;
use ontostore_core::ParamValue;
use ontostore_core::ParameterSet;
use ontostore_core::Protocol;
use ontostore_core::ResourceError;
use serde_json::Value;
use serde_json::json;

#[derive(Default)]
struct MemoryEngine {
    connects: AtomicUsize,
    last_targets: Mutex<Vec<CacheTarget>>,
    entries: Arc<Mutex<HashMap<CacheKey, Vec<u8>>>>,
}

struct MemoryBackend {
    entries: Arc<Mutex<HashMap<CacheKey, Vec<u8>>>>,
}

impl CacheEngine for MemoryEngine {
    fn protocol(&self) -> Protocol {
        Protocol::Memcached
    }

    fn connect(
        &self,
        targets: &[CacheTarget],
        _params: &ParameterSet,
    ) -> Result<Box<dyn CacheBackend>, ResourceError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_targets.lock().unwrap() = targets.to_vec();
        Ok(Box::new(MemoryBackend {
            entries: Arc::clone(&self.entries),
        }))
    }
}

impl CacheBackend for MemoryBackend {
    fn set(&self, key: &CacheKey, value: &[u8], _ttl: u32) -> Result<(), ResourceError> {
        if value.len() > 64 {
            return Err(ResourceError::cache(14, "item too large"));
        }
        self.entries.lock().unwrap().insert(key.clone(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Outcome<Vec<u8>> {
        self.entries.lock().unwrap().get(key).cloned().map_or(Outcome::NotFound, Outcome::Success)
    }

    fn delete(&self, key: &CacheKey) -> Outcome<()> {
        self.entries.lock().unwrap().remove(key).map_or(Outcome::NotFound, |_| Outcome::Success(()))
    }

    fn flush(&self) -> Result<(), ResourceError> {
        self.entries.lock().unwrap().clear();
        Ok(())
    }

    fn item_count(&self) -> Result<u64, ResourceError> {
        Ok(self.entries.lock().unwrap().len() as u64)
    }

    fn stats(&self) -> Result<Value, ResourceError> {
        Ok(json!({ "items": self.entries.lock().unwrap().len() }))
    }
}

fn resource(dsn: &str) -> (Arc<MemoryEngine>, CacheResource) {
    let engine = Arc::new(MemoryEngine::default());
    let resource = CacheResource::from_dsn(engine.clone(), dsn).unwrap();
    (engine, resource)
}

#[test]
fn zero_targets_means_not_connected() {
    let engine = Arc::new(MemoryEngine::default());
    let cache = CacheResource::new(engine.clone());
    assert!(!cache.is_connected());
    cache.add_target(CacheTarget::Tcp {
        host: "cache.local".to_string(),
        port: Some(11211),
    });
    assert!(cache.is_connected());
    assert_eq!(engine.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn open_without_targets_is_configuration_error() {
    let engine = Arc::new(MemoryEngine::default());
    let cache = CacheResource::new(engine.clone());
    let err = cache.set(&CacheKey::from("k"), b"v", NO_EXPIRY).unwrap_err();
    assert!(err.is_configuration());
    assert!(cache.get(&CacheKey::from("k")).is_failure());
    assert_eq!(engine.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn protocol_mismatch_is_rejected_before_connect() {
    let (engine, cache) = resource("sqlite+cache:///tmp/cache.sqlite3");
    assert!(cache.open().unwrap_err().is_configuration());
    assert_eq!(engine.connects.load(Ordering::SeqCst), 0);
}

#[test]
fn set_get_delete_follow_tri_state_contract() {
    let (_engine, cache) = resource("memcached://cache.local:11211");
    let key = CacheKey::from("alpha");
    assert_eq!(cache.get(&key), Outcome::NotFound);
    assert_eq!(cache.delete(&key), Outcome::NotFound);
    cache.set(&key, b"one", NO_EXPIRY).unwrap();
    assert_eq!(cache.get(&key), Outcome::Success(b"one".to_vec()));
    assert_eq!(cache.delete(&key), Outcome::Success(()));
    assert!(cache.get(&key).is_not_found());
}

#[test]
fn text_and_integer_keys_are_distinct() {
    let (_engine, cache) = resource("memcached://cache.local");
    cache.set(&CacheKey::from("1"), b"text", NO_EXPIRY).unwrap();
    assert!(cache.get(&CacheKey::from(1_i64)).is_not_found());
    cache.set(&CacheKey::from(1_i64), b"int", NO_EXPIRY).unwrap();
    assert_eq!(cache.get(&CacheKey::from("1")).success(), Some(b"text".to_vec()));
    assert_eq!(cache.item_count().unwrap(), 2);
}

#[test]
fn backend_rejection_surfaces_code() {
    let (_engine, cache) = resource("memcached://cache.local");
    let err = cache.set(&CacheKey::from("big"), &[0_u8; 128], NO_EXPIRY).unwrap_err();
    assert_eq!(err.backend_code(), Some(14));
}

#[test]
fn json_helpers_round_trip_values() {
    let (_engine, cache) = resource("memcached://cache.local");
    let key = CacheKey::from(7_i64);
    cache.set_json(&key, &json!({"a": 1}), NO_EXPIRY).unwrap();
    let value: Outcome<Value> = cache.get_json(&key);
    assert_eq!(value, Outcome::Success(json!({"a": 1})));
    cache.set(&key, b"not json", NO_EXPIRY).unwrap();
    assert!(cache.get_json::<Value>(&key).is_failure());
}

#[test]
fn add_target_releases_open_handle() {
    let (engine, cache) = resource("memcached://a:11211");
    cache.open().unwrap();
    assert!(cache.is_open());
    cache.add_target("b:11212".parse().unwrap());
    assert!(!cache.is_open());
    cache.flush().unwrap();
    assert_eq!(engine.connects.load(Ordering::SeqCst), 2);
    assert_eq!(engine.last_targets.lock().unwrap().len(), 2);
}

#[test]
fn routing_param_change_rederives_target() {
    let (_engine, cache) = resource("memcached://a:11211");
    assert_eq!(cache.targets()[0].to_string(), "a:11211");
    cache.set_param(ParamKey::Socket, ParamValue::from("/run/memcached.sock")).unwrap();
    assert_eq!(cache.targets(), vec![CacheTarget::Socket("/run/memcached.sock".into())]);
    assert_eq!(cache.dsn(), "memcached:///run/memcached.sock");
}

#[test]
fn target_strings_parse() {
    assert_eq!(
        "cache.local".parse::<CacheTarget>().unwrap(),
        CacheTarget::Tcp {
            host: "cache.local".to_string(),
            port: None,
        }
    );
    assert_eq!(
        "[::1]:11211".parse::<CacheTarget>().unwrap(),
        CacheTarget::Tcp {
            host: "[::1]".to_string(),
            port: Some(11211),
        }
    );
    assert!("host:notaport".parse::<CacheTarget>().is_err());
    assert!("".parse::<CacheTarget>().is_err());
}

#[test]
fn shards_are_stable_and_in_range() {
    let key = CacheKey::from("tag:label");
    let first = key.shard(3);
    assert!(first < 3);
    assert_eq!(key.shard(3), first);
    assert_eq!(key.shard(0), 0);
    assert_ne!(CacheKey::from("1").digest(), CacheKey::from(1_i64).digest());
}
