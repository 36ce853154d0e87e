// crates/ontostore-tags/src/lib.rs
// ============================================================================
// Module: Ontostore Tags Library
// Description: Tag identifier cache and seed table.
// Purpose: Resolve ontology tag identifiers through a shared cache.
// Dependencies: ontostore-core, serde, serde_json, thiserror, toml, tracing
// ============================================================================

//! ## Overview
//! [`TagCache`] layers two identifier namespaces over a
//! [`ontostore_core::CacheResource`] and seeds empty stores from a
//! [`SeedTable`].
//! Invariants:
//! - Seeding happens at most once per cold store.
//! - Seed tables are validated before use.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod seed;
pub mod tag;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::Initialization;
pub use cache::MissPolicy;
pub use cache::TagCache;
pub use cache::TagCacheError;
pub use seed::SeedError;
pub use seed::SeedTable;
pub use tag::CONNECTION_GID_PREFIX;
pub use tag::Gid;
pub use tag::Nid;
pub use tag::TagRecord;
pub use tag::connection_data_type;
