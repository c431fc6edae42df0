// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! The Content Store (component A): hash-addressed item storage with
//! insert-if-absent duplicate suppression.
//!
//! Written only by the Set Builder and read only by the Builder and the
//! merge surface; the allocation core itself never touches this store.

pub mod ingest;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use qs_types::{CategoryId, ContentHash, Item, ItemId};
use thiserror::Error;

/// Errors surfaced by a [`ContentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be read or written.
    #[error("content store unavailable: {0}")]
    Unavailable(String),
    /// A call did not complete before its deadline.
    #[error("content store call timed out")]
    Timeout,
}

/// Result of a [`ContentStore::put_batch`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PutBatchOutcome {
    /// Items newly stored.
    pub stored: usize,
    /// Items skipped because their content-hash already existed.
    pub skipped_duplicate_by_hash: usize,
}

/// A key used by [`ContentStore::get_batch`]: an item must match both its
/// id and its recorded hash to be returned, guarding against an id being
/// looked up against stale content.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemKey {
    /// The item's id.
    pub id: ItemId,
    /// The hash the caller expects this id to still carry.
    pub hash: ContentHash,
}

/// The Content Store's storage contract.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Inserts every item in `items` whose hash is not already present.
    /// Insert-if-absent at the hash index: never a pre-read then insert,
    /// so two concurrent builders racing on the same hash cannot both
    /// succeed.
    async fn put_batch(&self, items: Vec<Item>) -> Result<PutBatchOutcome, StoreError>;

    /// Returns every item matching a key in `keys`, silently omitting
    /// misses.
    async fn get_batch(&self, keys: &[ItemKey]) -> Result<Vec<Item>, StoreError>;

    /// Returns items in `category`, ascending by id, optionally starting
    /// strictly after `after_id`. Used by the Builder to read past the
    /// catalog's watermark.
    async fn query_by_category(&self, category: &CategoryId, after_id: Option<&ItemId>) -> Result<Vec<Item>, StoreError>;

    /// Returns every item recorded under `hash` (ordinarily zero or one,
    /// given insert-if-absent, but the contract allows for a store that
    /// predates the dedupe index having more).
    async fn query_by_hash(&self, hash: &ContentHash) -> Result<Vec<Item>, StoreError>;
}
