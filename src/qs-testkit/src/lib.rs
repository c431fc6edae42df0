// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! Shared fixtures for other crates' test modules: a fixed clock (so
//! assertions about age-cap boundaries don't depend on wall-clock time)
//! and small constructors for [`Item`], [`Set`], and [`LedgerEntry`]
//! values. Each crate's own tests are free to keep using ad hoc local
//! helpers where that reads better; this crate exists for the fixtures
//! that were otherwise copy-pasted verbatim across `qs-builder`,
//! `qs-eviction`, and `qs-catalog`'s test modules.

use chrono::{DateTime, TimeZone, Utc};
use qs_types::{CategoryId, ContentHash, Item, ItemId, ItemRef, LedgerEntry, Set, SetId};

/// A fixed instant (2026-07-28T00:00:00Z) used as `now` across test
/// suites that need a stable reference point for age-cap and watermark
/// assertions.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap()
}

/// Builds a minimal [`Item`] in `category`, with a content hash derived
/// from `id` so distinct ids never collide by accident in a test.
pub fn item(id: &str, category: &str) -> Item {
    Item {
        id: ItemId(id.to_string()),
        hash: ContentHash(format!("hash-{id}")),
        category_id: CategoryId(category.to_string()),
        payload: serde_json::json!({ "prompt": id }),
    }
}

/// Builds a [`Set`] with `count` refs named `<id>-0`, `<id>-1`, ... so
/// tests that only care about a set's identity and size don't need to
/// hand-construct refs.
pub fn set(id: &str, category: &str, watermark: &str, created_at: DateTime<Utc>, ref_count: usize) -> Set {
    let refs = (0..ref_count)
        .map(|i| ItemRef {
            id: ItemId(format!("{id}-{i}")),
            hash: ContentHash(format!("hash-{id}-{i}")),
        })
        .collect();
    Set {
        set_id: SetId(id.to_string()),
        category_id: CategoryId(category.to_string()),
        refs,
        created_at,
        watermark: ItemId(watermark.to_string()),
    }
}

/// Builds a [`LedgerEntry`] assigned at `assigned_at`.
pub fn ledger_entry(set_id: &str, assigned_at: DateTime<Utc>) -> LedgerEntry {
    LedgerEntry {
        set_id: SetId(set_id.to_string()),
        assigned_at: Some(assigned_at),
    }
}

/// Builds a [`LedgerEntry`] with no recorded timestamp, modeling the
/// at-least-once crash window between a ledger append and its timestamp
/// write.
pub fn ledger_entry_unknown_age(set_id: &str) -> LedgerEntry {
    LedgerEntry {
        set_id: SetId(set_id.to_string()),
        assigned_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_now_is_stable() {
        assert_eq!(fixed_now(), fixed_now());
    }

    #[test]
    fn set_builds_requested_ref_count() {
        let s = set("S1", "cat-X", "i10", fixed_now(), 3);
        assert_eq!(s.refs.len(), 3);
        assert_eq!(s.category_id, CategoryId("cat-X".into()));
    }
}
