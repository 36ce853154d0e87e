// crates/ontostore-store-sqlite/src/lib.rs
// ============================================================================
// Module: Ontostore SQLite Store Library
// Description: SQLite cache engine and document engine.
// Purpose: Back the `sqlite+cache` and `sqlite` protocols.
// Dependencies: ontostore-core, rusqlite, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`SqliteCacheEngine`] stores cache entries in one or more `SQLite` files
//! and [`SqliteDocumentEngine`] maps the server, database, and collection
//! tiers onto a data directory, database files, and document tables.
//! Invariants:
//! - Every backend failure keeps the `SQLite` extended result code.
//! - Connection tuning comes from the DSN option bag.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod documents;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::DEFAULT_STORE;
pub use cache::SqliteCacheBackend;
pub use cache::SqliteCacheEngine;
pub use documents::SqliteCollection;
pub use documents::SqliteDatabase;
pub use documents::SqliteDocumentEngine;
pub use documents::SqliteServer;
pub use store::SqliteConnectionOptions;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
