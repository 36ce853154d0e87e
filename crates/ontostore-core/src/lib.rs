// crates/ontostore-core/src/lib.rs
// ============================================================================
// Module: Ontostore Core Library
// Description: DSN codec, connection resources, hierarchy, and cache contract.
// Purpose: Shared data-access layer for ontology record stores.
// Dependencies: percent-encoding, serde, serde_json, sha2, thiserror, tracing, url
// ============================================================================

//! ## Overview
//! Ontostore core turns DSN strings into typed [`ParameterSet`]s and back,
//! and defines the lazily-opened [`ConnectionResource`] lifecycle shared by
//! the key/value [`CacheResource`] and the document-store tiers
//! ([`ServerResource`], [`DatabaseResource`], [`CollectionResource`]).
//! Backends plug in through [`CacheEngine`] and [`DocumentEngine`].
//! Invariants:
//! - Resources never contact a backend before validation succeeds.
//! - Cache misses are [`Outcome::NotFound`], never errors.
//! - Backend failures carry the backend's native code and message.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod cache;
pub mod dsn;
pub mod error;
pub mod hierarchy;
pub mod params;
pub mod protocol;
pub mod resource;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use cache::CacheBackend;
pub use cache::CacheEngine;
pub use cache::CacheKey;
pub use cache::CacheResource;
pub use cache::CacheTarget;
pub use cache::NO_EXPIRY;
pub use cache::Outcome;
pub use dsn::DsnDialect;
pub use error::ResourceError;
pub use error::UNKNOWN_BACKEND_CODE;
pub use hierarchy::CollectionResource;
pub use hierarchy::DatabaseResource;
pub use hierarchy::DocumentEngine;
pub use hierarchy::ServerResource;
pub use params::ParamKey;
pub use params::ParamKind;
pub use params::ParamValue;
pub use params::ParameterSet;
pub use protocol::Protocol;
pub use protocol::ResourceKind;
pub use resource::ConnectionResource;
pub use resource::ResourceCore;
