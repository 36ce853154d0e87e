// crates/ontostore-memcached/src/lib.rs
// ============================================================================
// Module: Ontostore Memcached Library
// Description: Memcached cache engine over the text protocol.
// Purpose: Back the `memcached` protocol.
// Dependencies: ontostore-core, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`MemcachedEngine`] plugs memcached servers into
//! [`ontostore_core::CacheResource`]. The [`protocol`] module holds the wire
//! codec; [`client`] owns sockets and key distribution.
//! Invariants:
//! - Failures carry libmemcached return codes.
//! - No request is retried.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;
pub mod protocol;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::DEFAULT_PORT;
pub use client::MemcachedBackend;
pub use client::MemcachedEngine;
pub use client::MemcachedOptions;
pub use protocol::MemcachedError;
pub use protocol::encode_key;
