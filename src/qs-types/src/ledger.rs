use chrono::{DateTime, Utc};

use crate::SetId;

/// One (set-id, assigned-at) pair from a user's per-category allocation
/// list, in oldest-first order. Shared between `qs-ledger` (which stores
/// these durably) and `qs-eviction` (which decides which to drop).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    /// The assigned set.
    pub set_id: SetId,
    /// When it was assigned. `None` models the at-least-once crash window:
    /// the ledger append succeeded but the timestamp write had not yet
    /// landed. Such an entry is never evicted by the age-cap, since its
    /// age is unknown rather than known-expired; the next write to this
    /// (user, category) reconciles it to "now".
    pub assigned_at: Option<DateTime<Utc>>,
}
