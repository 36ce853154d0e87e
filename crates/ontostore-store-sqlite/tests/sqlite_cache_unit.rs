// crates/ontostore-store-sqlite/tests/sqlite_cache_unit.rs
// ============================================================================
// Module: SQLite Cache Unit Tests
// Description: Cache semantics of the sqlite+cache engine.
// Purpose: Validate tri-state lookups, TTL expiry, partitions, and sharding.
// ============================================================================

//! ## Overview
//! Unit-level tests for the `SQLite` cache engine driven through
//! [`CacheResource`]:
//! - Tri-state get/delete outcomes and key-kind separation
//! - TTL expiry and lazy purge
//! - Persistent-id partitions sharing one file
//! - Multi-file sharding and target validation

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

use std::path::Path;
use std::sync::Arc;

use ontostore_core::CacheKey;
use ontostore_core::CacheResource;
use ontostore_core::CacheTarget;
use ontostore_core::ConnectionResource;
use ontostore_core::NO_EXPIRY;
use ontostore_core::Outcome;
use ontostore_core::ResourceError;
use ontostore_store_sqlite::SqliteCacheEngine;
use rusqlite::Connection;
use rusqlite::params;

fn cache_at(path: &Path, fragment: Option<&str>) -> CacheResource {
    let mut dsn = format!("sqlite+cache://{}", path.display());
    if let Some(fragment) = fragment {
        dsn.push('#');
        dsn.push_str(fragment);
    }
    CacheResource::from_dsn(Arc::new(SqliteCacheEngine::new()), &dsn).unwrap()
}

fn count_rows(path: &Path) -> i64 {
    let connection = Connection::open(path).unwrap();
    connection.query_row("SELECT COUNT(1) FROM cache_entries", params![], |row| row.get(0)).unwrap()
}

#[test]
fn get_set_delete_follow_tri_state_contract() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_at(&dir.path().join("cache.sqlite3"), None);
    let key = CacheKey::from(":namespace");
    assert_eq!(cache.get(&key), Outcome::NotFound);
    assert_eq!(cache.delete(&key), Outcome::NotFound);
    cache.set(&key, b"1", NO_EXPIRY).unwrap();
    assert_eq!(cache.get(&key), Outcome::Success(b"1".to_vec()));
    cache.set(&key, b"2", NO_EXPIRY).unwrap();
    assert_eq!(cache.get(&key), Outcome::Success(b"2".to_vec()));
    assert_eq!(cache.delete(&key), Outcome::Success(()));
    assert_eq!(cache.get(&key), Outcome::NotFound);
}

#[test]
fn text_and_integer_keys_do_not_collide() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_at(&dir.path().join("cache.sqlite3"), None);
    cache.set(&CacheKey::from("42"), b"text", NO_EXPIRY).unwrap();
    cache.set(&CacheKey::from(42_i64), b"int", NO_EXPIRY).unwrap();
    assert_eq!(cache.get(&CacheKey::from("42")).success(), Some(b"text".to_vec()));
    assert_eq!(cache.get(&CacheKey::from(42_i64)).success(), Some(b"int".to_vec()));
    assert_eq!(cache.item_count().unwrap(), 2);
}

#[test]
fn expired_entries_are_not_returned() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.sqlite3");
    let cache = cache_at(&path, None);
    cache.set(&CacheKey::from("short"), b"v", 60).unwrap();
    cache.set(&CacheKey::from("forever"), b"v", NO_EXPIRY).unwrap();
    let connection = Connection::open(&path).unwrap();
    connection
        .execute("UPDATE cache_entries SET expires_at = 1 WHERE key = 'short'", params![])
        .unwrap();
    assert!(cache.get(&CacheKey::from("short")).is_not_found());
    assert!(cache.delete(&CacheKey::from("short")).is_not_found());
    assert_eq!(cache.item_count().unwrap(), 1);
    assert_eq!(count_rows(&path), 1);
}

#[test]
fn persistent_ids_partition_one_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.sqlite3");
    let tags = cache_at(&path, Some("tags"));
    let terms = cache_at(&path, Some("terms"));
    tags.set(&CacheKey::from(1_i64), b"tag", NO_EXPIRY).unwrap();
    terms.set(&CacheKey::from(1_i64), b"term", NO_EXPIRY).unwrap();
    tags.flush().unwrap();
    assert!(tags.get(&CacheKey::from(1_i64)).is_not_found());
    assert_eq!(terms.get(&CacheKey::from(1_i64)).success(), Some(b"term".to_vec()));
    assert_eq!(terms.stats().unwrap()["store"], "terms");
}

#[test]
fn keys_spread_across_added_targets() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.sqlite3");
    let second = dir.path().join("b.sqlite3");
    let cache = cache_at(&first, None);
    cache.add_target(CacheTarget::Socket(second.clone()));
    for index in 0 .. 32_i64 {
        cache.set(&CacheKey::from(index), &index.to_be_bytes(), NO_EXPIRY).unwrap();
    }
    for index in 0 .. 32_i64 {
        assert_eq!(cache.get(&CacheKey::from(index)).success(), Some(index.to_be_bytes().to_vec()));
    }
    assert_eq!(cache.item_count().unwrap(), 32);
    assert!(count_rows(&first) > 0);
    assert!(count_rows(&second) > 0);
    assert_eq!(count_rows(&first) + count_rows(&second), 32);
}

#[test]
fn tcp_targets_are_configuration_errors() {
    let cache = CacheResource::from_dsn(Arc::new(SqliteCacheEngine::new()), "sqlite+cache://cache.local:11211")
        .unwrap();
    assert!(cache.is_connected());
    let err = cache.set(&CacheKey::from("k"), b"v", NO_EXPIRY).unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn directory_targets_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_at(dir.path(), None);
    assert!(cache.open().unwrap_err().is_configuration());
}

#[test]
fn schema_version_mismatch_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.sqlite3");
    {
        let connection = Connection::open(&path).unwrap();
        connection
            .execute_batch(
                "CREATE TABLE store_meta (version INTEGER NOT NULL); INSERT INTO store_meta VALUES (99);",
            )
            .unwrap();
    }
    let cache = cache_at(&path, None);
    let err = cache.open().unwrap_err();
    assert!(matches!(err, ResourceError::Connection { .. }));
    assert!(err.to_string().contains("unsupported schema version"));
}

#[test]
fn stats_report_shards() {
    let dir = tempfile::tempdir().unwrap();
    let cache = cache_at(&dir.path().join("cache.sqlite3"), None);
    cache.set(&CacheKey::from("k"), b"v", NO_EXPIRY).unwrap();
    let stats = cache.stats().unwrap();
    assert_eq!(stats["engine"], "sqlite+cache");
    assert_eq!(stats["store"], "default");
    assert_eq!(stats["shards"][0]["items"], 1);
}
