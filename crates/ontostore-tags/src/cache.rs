// crates/ontostore-tags/src/cache.rs
// ============================================================================
// Module: Tag Cache
// Description: Two-namespace tag identifier cache over a cache resource.
// Purpose: Resolve GIDs to NIDs and NIDs to tag records without store trips.
// Dependencies: ontostore-core, serde_json, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`TagCache`] wraps one [`CacheResource`]. The GID namespace maps text keys
//! to native identifiers and the NID namespace maps integer keys to JSON tag
//! records. An empty store is seeded once on construction; a store that
//! already holds entries is used as is.
//! Invariants:
//! - GID keys are [`CacheKey::Text`]; NID keys are [`CacheKey::Integer`].
//! - Misses under [`MissPolicy::Reject`] fail with
//!   [`TagCacheError::UnknownIdentifier`]; backend failures are always
//!   [`TagCacheError::Resource`].
//! - GID and NID writes are independent operations.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use ontostore_core::CacheKey;
use ontostore_core::CacheResource;
use ontostore_core::NO_EXPIRY;
use ontostore_core::Outcome;
use ontostore_core::ResourceError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing::info;

use crate::seed::SeedError;
use crate::seed::SeedTable;
use crate::tag::Gid;
use crate::tag::Nid;
use crate::tag::TagRecord;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tag cache errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum TagCacheError {
    /// Identifier missing under [`MissPolicy::Reject`].
    #[error("unknown tag identifier: {0}")]
    UnknownIdentifier(String),
    /// Cache resource failure.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// Seed table failure.
    #[error(transparent)]
    Seed(#[from] SeedError),
    /// Cached value could not be encoded or decoded.
    #[error("tag codec error: {0}")]
    Codec(String),
}

// ============================================================================
// SECTION: Policies
// ============================================================================

/// Behavior when a looked-up identifier is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissPolicy {
    /// Report the miss as `None` or `false`.
    #[default]
    Allow,
    /// Fail with [`TagCacheError::UnknownIdentifier`].
    Reject,
}

/// How construction found the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initialization {
    /// The store was empty and the seed tags were written.
    Seeded {
        /// Number of seed tags written.
        tags: usize,
    },
    /// The store already held entries; nothing was written.
    Warm,
}

// ============================================================================
// SECTION: Tag Cache
// ============================================================================

/// Tag identifier cache.
#[derive(Debug)]
pub struct TagCache {
    /// Backing cache.
    cache: Arc<CacheResource>,
    /// Construction outcome.
    initialization: Initialization,
}

impl TagCache {
    /// Wraps `cache`, seeding it from `seeds` when it holds no entries.
    ///
    /// A seed failure part way through leaves the written tags in place; the
    /// store then counts as warm on the next construction.
    ///
    /// # Errors
    ///
    /// Returns [`TagCacheError`] when the cache cannot be opened, counted, or
    /// written, or a seed record cannot be encoded.
    pub fn new(cache: Arc<CacheResource>, seeds: &SeedTable) -> Result<Self, TagCacheError> {
        let entries = cache.item_count()?;
        let initialization = if entries > 0 {
            debug!(entries, "tag cache is warm");
            Initialization::Warm
        } else {
            for tag in &seeds.tags {
                write_json(&cache, &gid_key(&tag.gid), &tag.nid)?;
                write_json(&cache, &nid_key(tag.nid), tag)?;
            }
            info!(tags = seeds.len(), version = seeds.version, "tag cache seeded");
            Initialization::Seeded {
                tags: seeds.len(),
            }
        };
        Ok(Self {
            cache,
            initialization,
        })
    }

    /// Returns how construction found the store.
    #[must_use]
    pub const fn initialization(&self) -> Initialization {
        self.initialization
    }

    /// Returns the backing cache resource.
    #[must_use]
    pub const fn resource(&self) -> &Arc<CacheResource> {
        &self.cache
    }

    /// Maps `gid` to `nid`, replacing any existing mapping.
    ///
    /// # Errors
    ///
    /// Returns [`TagCacheError`] when the write fails.
    pub fn set_tag_id(&self, gid: &Gid, nid: Nid) -> Result<(), TagCacheError> {
        write_json(&self.cache, &gid_key(gid), &nid)
    }

    /// Resolves `gid` to its native identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TagCacheError::UnknownIdentifier`] on a rejected miss and
    /// [`TagCacheError`] on backend or decoding failures.
    pub fn get_tag_id(&self, gid: &Gid, policy: MissPolicy) -> Result<Option<Nid>, TagCacheError> {
        read_json(&self.cache, &gid_key(gid), policy)
    }

    /// Removes the mapping for `gid`; returns false when it was absent.
    ///
    /// # Errors
    ///
    /// Returns [`TagCacheError::UnknownIdentifier`] on a rejected miss and
    /// [`TagCacheError::Resource`] on backend failures.
    pub fn del_tag_id(&self, gid: &Gid, policy: MissPolicy) -> Result<bool, TagCacheError> {
        remove(&self.cache, &gid_key(gid), policy)
    }

    /// Stores `record` under its native identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TagCacheError`] when encoding or the write fails.
    pub fn set_tag_object(&self, record: &TagRecord) -> Result<(), TagCacheError> {
        write_json(&self.cache, &nid_key(record.nid), record)
    }

    /// Fetches the record stored under `nid`.
    ///
    /// # Errors
    ///
    /// Returns [`TagCacheError::UnknownIdentifier`] on a rejected miss and
    /// [`TagCacheError`] on backend or decoding failures.
    pub fn get_tag_object(&self, nid: Nid, policy: MissPolicy) -> Result<Option<TagRecord>, TagCacheError> {
        read_json(&self.cache, &nid_key(nid), policy)
    }

    /// Removes the record stored under `nid`; returns false when it was
    /// absent.
    ///
    /// # Errors
    ///
    /// Returns [`TagCacheError::UnknownIdentifier`] on a rejected miss and
    /// [`TagCacheError::Resource`] on backend failures.
    pub fn del_tag_object(&self, nid: Nid, policy: MissPolicy) -> Result<bool, TagCacheError> {
        remove(&self.cache, &nid_key(nid), policy)
    }

    /// Returns backend statistics.
    ///
    /// # Errors
    ///
    /// Returns [`TagCacheError::Resource`] when the backend cannot be queried.
    pub fn stats(&self) -> Result<Value, TagCacheError> {
        Ok(self.cache.stats()?)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the GID namespace key.
fn gid_key(gid: &Gid) -> CacheKey {
    CacheKey::Text(gid.as_str().to_string())
}

/// Returns the NID namespace key.
const fn nid_key(nid: Nid) -> CacheKey {
    CacheKey::Integer(nid.get())
}

/// Encodes `value` as JSON and stores it without expiry.
fn write_json<T: Serialize>(cache: &CacheResource, key: &CacheKey, value: &T) -> Result<(), TagCacheError> {
    let bytes = serde_json::to_vec(value).map_err(|err| TagCacheError::Codec(format!("encode {key}: {err}")))?;
    Ok(cache.set(key, &bytes, NO_EXPIRY)?)
}

/// Fetches and decodes a JSON value, applying the miss policy.
fn read_json<T: DeserializeOwned>(
    cache: &CacheResource,
    key: &CacheKey,
    policy: MissPolicy,
) -> Result<Option<T>, TagCacheError> {
    match cache.get(key) {
        Outcome::Success(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| TagCacheError::Codec(format!("decode {key}: {err}"))),
        Outcome::NotFound => miss(key, policy).map(|()| None),
        Outcome::Failure(err) => Err(err.into()),
    }
}

/// Deletes a key, applying the miss policy.
fn remove(cache: &CacheResource, key: &CacheKey, policy: MissPolicy) -> Result<bool, TagCacheError> {
    match cache.delete(key) {
        Outcome::Success(()) => Ok(true),
        Outcome::NotFound => miss(key, policy).map(|()| false),
        Outcome::Failure(err) => Err(err.into()),
    }
}

/// Applies the miss policy to an absent key.
fn miss(key: &CacheKey, policy: MissPolicy) -> Result<(), TagCacheError> {
    match policy {
        MissPolicy::Allow => Ok(()),
        MissPolicy::Reject => Err(TagCacheError::UnknownIdentifier(key.to_string())),
    }
}
