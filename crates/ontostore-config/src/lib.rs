// crates/ontostore-config/src/lib.rs
// ============================================================================
// Module: Ontostore Config Library
// Description: Configuration model, validation, and protocol dispatch.
// Purpose: Single source of truth for ontostore.toml semantics.
// Dependencies: ontostore-core, ontostore-memcached, ontostore-store-sqlite
// ============================================================================

//! ## Overview
//! `ontostore-config` loads `ontostore.toml` with strict, fail-closed
//! validation and maps DSN protocols onto concrete engines.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod connect;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use connect::*;
