// crates/ontostore-store-sqlite/tests/sqlite_documents_unit.rs
// ============================================================================
// Module: SQLite Document Engine Unit Tests
// Description: Resource hierarchy over the sqlite document engine.
// Purpose: Validate recursive opening, document API, and introspection.
// ============================================================================

//! ## Overview
//! Unit-level tests for the `SQLite` document engine:
//! - Server, database, and collection tiers opened parent first
//! - Document insert/upsert/find/delete/count and JSON field indexes
//! - Name and path validation failing before any file is touched
//! - Stats passthrough at every tier

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

use ontostore_core::CollectionResource;
use ontostore_core::ConnectionResource;
use ontostore_core::ParamKey;
use ontostore_core::ParameterSet;
use ontostore_core::ServerResource;
use ontostore_store_sqlite::SqliteDocumentEngine;
use ontostore_store_sqlite::SqliteStoreError;
use serde_json::json;

fn server_at(root: &Path) -> Arc<ServerResource<SqliteDocumentEngine>> {
    let dsn = format!("sqlite://{}", root.display());
    ServerResource::from_dsn(Arc::new(SqliteDocumentEngine::new()), &dsn).unwrap()
}

#[test]
fn collection_open_creates_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("data");
    let server = server_at(&root);
    let collection = server.database("onto").unwrap().collection("tags").unwrap();
    assert!(!root.exists());
    let handle = collection.open().unwrap();
    assert_eq!(handle.name(), "tags");
    assert!(root.join("onto.sqlite3").is_file());
    assert!(server.is_open());
}

#[test]
fn documents_round_trip_through_handle() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_at(dir.path());
    let collection = server.database("onto").unwrap().collection("terms").unwrap().open().unwrap();
    collection.insert("t1", &json!({"label": "Name", "kind": "scalar"})).unwrap();
    collection.insert("t2", &json!({"label": "Kind", "kind": "array"})).unwrap();
    assert_eq!(collection.find("t1").unwrap(), Some(json!({"label": "Name", "kind": "scalar"})));
    assert_eq!(collection.find("missing").unwrap(), None);

    let err = collection.insert("t1", &json!({})).unwrap_err();
    assert!(matches!(err, SqliteStoreError::Db { code: 1555, .. }));

    collection.upsert("t1", &json!({"label": "Label", "kind": "array"})).unwrap();
    let arrays = collection.find_by("kind", &json!("array")).unwrap();
    assert_eq!(arrays.iter().map(|(id, _)| id.as_str()).collect::<Vec<_>>(), vec!["t1", "t2"]);

    assert_eq!(collection.count().unwrap(), 2);
    assert!(collection.delete("t2").unwrap());
    assert!(!collection.delete("t2").unwrap());
    assert_eq!(collection.count().unwrap(), 1);
}

#[test]
fn json_field_indexes_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_at(dir.path());
    let collection = server.database("onto").unwrap().collection("tags").unwrap();
    let handle = collection.open().unwrap();
    let index = handle.create_index("label.en").unwrap();
    assert_eq!(handle.create_index("label.en").unwrap(), index);
    assert!(handle.create_index("label;drop").is_err());
    assert_eq!(handle.index_names().unwrap(), vec![index.clone()]);
    let stats = collection.stats().unwrap();
    assert_eq!(stats["indexes"], json!([index]));
    assert_eq!(stats["database"], "onto");
}

#[test]
fn missing_data_directory_is_configuration_error() {
    let engine = Arc::new(SqliteDocumentEngine::new());
    let server = ServerResource::new(engine, ParameterSet::new());
    let err = server.stats().unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn invalid_names_fail_before_files_are_created() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_at(dir.path());
    let database = server.database("../escape").unwrap();
    assert!(database.open().unwrap_err().is_configuration());
    assert!(!dir.path().join("../escape.sqlite3").exists());
    let collection = server.database("onto").unwrap().collection("bad name").unwrap();
    assert!(collection.open().unwrap_err().is_configuration());
}

#[test]
fn detached_collection_is_configuration_error() {
    let engine = Arc::new(SqliteDocumentEngine::new());
    let params = ParameterSet::new().with(ParamKey::Collection, "tags").unwrap();
    let collection = CollectionResource::new(engine, params);
    assert!(collection.open().unwrap_err().is_configuration());
}

#[test]
fn stats_describe_each_tier() {
    let dir = tempfile::tempdir().unwrap();
    let server = server_at(dir.path());
    let database = server.database("onto").unwrap();
    let tags = database.collection("tags").unwrap();
    tags.open().unwrap().insert("1", &json!({"gid": ":namespace"})).unwrap();
    database.collection("terms").unwrap().open().unwrap();

    let server_stats = server.stats().unwrap();
    assert_eq!(server_stats["engine"], "sqlite");
    assert_eq!(server_stats["databases"][0]["name"], "onto");

    let database_stats = database.stats().unwrap();
    assert_eq!(database_stats["name"], "onto");
    assert_eq!(database_stats["collections"], json!([
        {"name": "tags", "documents": 1},
        {"name": "terms", "documents": 0},
    ]));
}

#[test]
fn file_as_data_directory_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain");
    std::fs::write(&file, b"x").unwrap();
    let server = server_at(&file);
    assert!(server.open().unwrap_err().is_configuration());
}
