use serde::{Deserialize, Serialize};

use crate::{CategoryId, ContentHash, ItemId};

/// A single unit of content in the Content Store. Identity is the pair
/// `(id, hash)`; items are append-only — once written they are never
/// mutated, and a duplicate-hash insert is suppressed by the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    /// Primary key.
    pub id: ItemId,
    /// Content hash, secondary-indexed for dedupe.
    pub hash: ContentHash,
    /// Category this item belongs to.
    pub category_id: CategoryId,
    /// Opaque payload (question text, media references, metadata, ...).
    /// The core never interprets this; it only partitions and references it.
    pub payload: serde_json::Value,
}

/// A reference to an `Item` as carried inside a `Set`. Sets freeze the
/// `(id, hash)` pair at creation time rather than embedding the full item,
/// so a set's `refs` never change even if later ingest re-derives content
/// for the same id (which should not happen, since items are append-only,
/// but the reference shape keeps that assumption explicit).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ItemRef {
    /// The referenced item's id.
    pub id: ItemId,
    /// The referenced item's hash, as of set creation.
    pub hash: ContentHash,
}
