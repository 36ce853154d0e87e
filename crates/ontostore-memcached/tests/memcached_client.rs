// crates/ontostore-memcached/tests/memcached_client.rs
// ============================================================================
// Module: Memcached Client Tests
// Description: Cache resource behavior against a socket-level stand-in.
// Purpose: Validate key encoding, failure codes, reconnects, and sharding.
// ============================================================================

//! ## Overview
//! Drives [`CacheResource`] with [`MemcachedEngine`] against an in-process
//! server:
//! - Tri-state lookups and wire key encoding
//! - Server rejections mapped to libmemcached codes
//! - Connection reuse and reconnect after a dropped socket
//! - Multi-server distribution, flush, and statistics

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

mod common;

use std::sync::Arc;

use common::FakeMemcached;
use common::closed_target;
use ontostore_core::CacheKey;
use ontostore_core::CacheResource;
use ontostore_core::CacheTarget;
use ontostore_core::ConnectionResource;
use ontostore_core::NO_EXPIRY;
use ontostore_core::Outcome;
use ontostore_memcached::MemcachedEngine;
use ontostore_memcached::protocol::CONNECTION_FAILURE;
use ontostore_memcached::protocol::NOT_STORED;
use ontostore_memcached::protocol::READ_FAILURE;
use ontostore_memcached::protocol::SERVER_ERROR;
use serde_json::json;

fn cache(dsn: &str) -> CacheResource {
    CacheResource::from_dsn(Arc::new(MemcachedEngine::new()), dsn).unwrap()
}

#[test]
fn get_set_delete_follow_tri_state_contract() {
    let server = FakeMemcached::start();
    let cache = cache(&server.dsn());
    let key = CacheKey::from(":namespace");
    assert_eq!(cache.get(&key), Outcome::NotFound);
    cache.set(&key, b"1", NO_EXPIRY).unwrap();
    assert_eq!(cache.get(&key), Outcome::Success(b"1".to_vec()));
    assert_eq!(cache.delete(&key), Outcome::Success(()));
    assert_eq!(cache.delete(&key), Outcome::NotFound);
    assert_eq!(cache.get(&key), Outcome::NotFound);
}

#[test]
fn keys_are_encoded_by_kind() {
    let server = FakeMemcached::start();
    let cache = cache(&server.dsn());
    cache.set(&CacheKey::from(":ns"), b"text", NO_EXPIRY).unwrap();
    cache.set(&CacheKey::from(42_i64), b"int", NO_EXPIRY).unwrap();
    cache.set(&CacheKey::from("with space"), b"hashed", NO_EXPIRY).unwrap();
    let keys = server.keys();
    assert_eq!(keys.len(), 3);
    assert!(keys.iter().any(|key| key.starts_with("h:") && key.len() == 66));
    assert!(keys.contains(&"n:42".to_string()));
    assert!(keys.contains(&"s::ns".to_string()));
    assert_eq!(cache.get(&CacheKey::from("with space")).success(), Some(b"hashed".to_vec()));
}

#[test]
fn ttls_are_sent_as_expirations() {
    let server = FakeMemcached::start();
    let cache = cache(&server.dsn());
    cache.set(&CacheKey::from("short"), b"v", 60).unwrap();
    cache.set(&CacheKey::from("forever"), b"v", NO_EXPIRY).unwrap();
    assert_eq!(server.exptime("s:short"), Some(60));
    assert_eq!(server.exptime("s:forever"), Some(0));
}

#[test]
fn server_rejections_carry_backend_codes() {
    let server = FakeMemcached::start();
    let cache = cache(&server.dsn());
    let err = cache.set(&CacheKey::from("reject"), b"v", NO_EXPIRY).unwrap_err();
    assert_eq!(err.backend_code(), Some(NOT_STORED));
    let err = cache.set(&CacheKey::from("full"), b"v", NO_EXPIRY).unwrap_err();
    assert_eq!(err.backend_code(), Some(SERVER_ERROR));
    cache.set(&CacheKey::from("after"), b"v", NO_EXPIRY).unwrap();
    assert_eq!(server.connections(), 1);
}

#[test]
fn dropped_connection_fails_once_then_reconnects() {
    let server = FakeMemcached::start();
    let cache = cache(&server.dsn());
    cache.set(&CacheKey::from("kept"), b"v", NO_EXPIRY).unwrap();
    let Outcome::Failure(err) = cache.get(&CacheKey::from("hangup")) else {
        panic!("expected failure");
    };
    assert_eq!(err.backend_code(), Some(READ_FAILURE));
    assert_eq!(cache.get(&CacheKey::from("kept")), Outcome::Success(b"v".to_vec()));
    assert_eq!(server.connections(), 2);
}

#[test]
fn unreachable_server_fails_operations_not_open() {
    let cache = cache(&format!("memcached://{}", closed_target()));
    cache.open().unwrap();
    assert!(cache.is_connected());
    let Outcome::Failure(err) = cache.get(&CacheKey::from("any")) else {
        panic!("expected failure");
    };
    assert_eq!(err.backend_code(), Some(CONNECTION_FAILURE));
    let err = cache.set(&CacheKey::from("any"), b"v", NO_EXPIRY).unwrap_err();
    assert_eq!(err.backend_code(), Some(CONNECTION_FAILURE));
}

#[test]
fn invalid_timeout_option_is_configuration_error() {
    let cache = cache("memcached://127.0.0.1:11211?connect_timeout_ms=soon");
    assert!(cache.open().unwrap_err().is_configuration());
}

#[test]
fn keys_spread_across_servers() {
    let first = FakeMemcached::start();
    let second = FakeMemcached::start();
    let cache = cache(&first.dsn());
    cache.add_target(second.target().parse::<CacheTarget>().unwrap());
    for value in 0 .. 32_i64 {
        cache.set(&CacheKey::from(value), b"v", NO_EXPIRY).unwrap();
    }
    assert!(!first.keys().is_empty());
    assert!(!second.keys().is_empty());
    assert_eq!(first.keys().len() + second.keys().len(), 32);
    assert_eq!(cache.item_count().unwrap(), 32);
    for value in 0 .. 32_i64 {
        assert!(cache.get(&CacheKey::from(value)).is_success());
    }
}

#[test]
fn flush_clears_every_server() {
    let first = FakeMemcached::start();
    let second = FakeMemcached::start();
    let cache = cache(&first.dsn());
    cache.add_target(second.target().parse::<CacheTarget>().unwrap());
    for value in 0 .. 8_i64 {
        cache.set(&CacheKey::from(value), b"v", NO_EXPIRY).unwrap();
    }
    cache.flush().unwrap();
    assert_eq!(cache.item_count().unwrap(), 0);
    assert!(first.keys().is_empty());
    assert!(second.keys().is_empty());
}

#[test]
fn stats_report_each_server() {
    let server = FakeMemcached::start();
    let cache = cache(&format!("{}#ontology", server.dsn()));
    cache.set(&CacheKey::from(1_i64), b"v", NO_EXPIRY).unwrap();
    let stats = cache.stats().unwrap();
    assert_eq!(stats["engine"], json!("memcached"));
    assert_eq!(stats["persistent_id"], json!("ontology"));
    assert_eq!(stats["servers"][0]["target"], json!(server.target()));
    assert_eq!(stats["servers"][0]["stats"]["curr_items"], json!("1"));
}

#[test]
fn json_values_round_trip() {
    let server = FakeMemcached::start();
    let cache = cache(&server.dsn());
    let key = CacheKey::from(7_i64);
    let record = json!({"gid": ":ns", "label": "namespace"});
    cache.set_json(&key, &record, NO_EXPIRY).unwrap();
    assert_eq!(cache.get_json::<serde_json::Value>(&key), Outcome::Success(record));
}
