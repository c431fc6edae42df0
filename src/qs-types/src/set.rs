use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CategoryId, ItemId, ItemRef, SetId};

/// An ordered, fixed-size bundle of item references within a single
/// category, produced by the builder. `refs` are fixed at creation time;
/// nothing downstream of the builder ever rewrites them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Set {
    /// Globally unique identifier.
    pub set_id: SetId,
    /// The category all of `refs` share (builder invariant: every ref's
    /// underlying item has this same `category_id`).
    pub category_id: CategoryId,
    /// Ordered item references, fixed at creation.
    pub refs: Vec<ItemRef>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Greatest item id consumed from the category during the batch that
    /// produced this set, shared across every set in that batch. This is
    /// the only state the builder needs to resume without re-scanning.
    pub watermark: ItemId,
}
