// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! The eviction policy: a pure function over a (user, category) ledger
//! snapshot that decides which set-ids to drop.
//!
//! Deliberately separated from the impure "apply the drop to the store"
//! step performed by `qs-ledger`/`qs-allocator` — this is what the design
//! notes call "decide what to remove (pure, easily unit-tested with a clock
//! injected) vs. apply removal (impure, tied to the store)". Nothing in
//! this crate reads the system clock; `now` always comes from the caller.

use chrono::{DateTime, Utc};
use qs_dyncfg::EvictionParams;
use qs_types::{months_ago, LedgerEntry, SetId};
use serde::{Deserialize, Serialize};

/// Why a set-id was marked for removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionReason {
    /// Count-cap: the list held more than `max_sets_per_category` entries;
    /// this was among the oldest beyond the cap.
    ExceededCap,
    /// Age-cap: `assigned_at` was older than `now - max_age_months`.
    AgeExpired,
}

/// The result of running the policy once over a ledger snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EvictionOutcome {
    /// Set-ids marked for removal, in the order they appeared in the
    /// input list, paired with why each was marked.
    pub removed: Vec<(SetId, EvictionReason)>,
}

impl EvictionOutcome {
    /// No entries marked for removal.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of entries marked for removal.
    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    /// `true` if nothing was marked for removal.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }
}

/// Decides which entries of `entries` (oldest-first order) should be
/// evicted, applying count-cap then age-cap, per spec:
///
/// 1. **Count cap.** If `n > max_sets_per_category`, mark the first
///    `n - max_sets_per_category` elements (the oldest) for removal, reason
///    [`EvictionReason::ExceededCap`].
/// 2. **Age cap.** For every entry not already marked, if `assigned_at` is
///    before `now - max_age_months` (a whole-calendar-month shift), mark
///    it, reason [`EvictionReason::AgeExpired`].
///
/// Eviction is a monotonic reduction: this function only ever proposes
/// removals, never additions, and the same snapshot always produces the
/// same outcome (it is a pure function of `entries`, `now`, and `params`).
pub fn evict(entries: &[LedgerEntry], now: DateTime<Utc>, params: EvictionParams) -> EvictionOutcome {
    let max_sets = params.max_sets_per_category as usize;
    let mut marked = vec![false; entries.len()];
    let mut removed = Vec::new();

    if entries.len() > max_sets {
        let overflow = entries.len() - max_sets;
        for (entry, mark) in entries.iter().zip(marked.iter_mut()).take(overflow) {
            *mark = true;
            removed.push((entry.set_id.clone(), EvictionReason::ExceededCap));
        }
    }

    let horizon = months_ago(now, params.max_age_months);
    for (entry, mark) in entries.iter().zip(marked.iter_mut()) {
        if *mark {
            continue;
        }
        if let Some(assigned_at) = entry.assigned_at {
            if assigned_at < horizon {
                *mark = true;
                removed.push((entry.set_id.clone(), EvictionReason::AgeExpired));
            }
        }
    }

    EvictionOutcome { removed }
}

/// Applies an [`EvictionOutcome`] to `entries`, returning the surviving
/// entries in their original relative order. Pure: the durable write that
/// mirrors this filtering is `qs-ledger`'s concern.
pub fn apply(entries: &[LedgerEntry], outcome: &EvictionOutcome) -> Vec<LedgerEntry> {
    if outcome.is_empty() {
        return entries.to_vec();
    }
    let removed_ids: std::collections::HashSet<&SetId> =
        outcome.removed.iter().map(|(id, _)| id).collect();
    entries
        .iter()
        .filter(|e| !removed_ids.contains(&e.set_id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(id: &str, assigned_at: DateTime<Utc>) -> LedgerEntry {
        LedgerEntry {
            set_id: SetId(id.to_string()),
            assigned_at: Some(assigned_at),
        }
    }

    fn params(max_sets: u32, max_age_months: u32) -> EvictionParams {
        EvictionParams {
            max_sets_per_category: max_sets,
            max_age_months,
        }
    }

    #[test]
    fn count_cap_evicts_oldest_first() {
        // Scenario 3 from the spec: maxSetsPerCategory=3, Ledger=[A,B,C],
        // about to append D. Eviction runs before the append, over [A,B,C].
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let entries = vec![
            entry("A", now),
            entry("B", now),
            entry("C", now),
        ];
        let outcome = evict(&entries, now, params(3, 2));
        assert!(outcome.is_empty(), "exactly at cap, nothing evicted yet");

        // Now simulate the append making it 4 before the *next* call's eviction.
        let entries_with_d = vec![
            entry("A", now),
            entry("B", now),
            entry("C", now),
            entry("D", now),
        ];
        let outcome = evict(&entries_with_d, now, params(3, 2));
        assert_eq!(
            outcome.removed,
            vec![(SetId("A".to_string()), EvictionReason::ExceededCap)]
        );
    }

    #[test]
    fn age_cap_evicts_entries_older_than_horizon() {
        // Scenario 4: maxAgeMonths=2, entries at (now-3mo, now-3mo, now-1wk).
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let three_months_ago = months_ago(now, 3);
        let one_week_ago = now - chrono::Duration::weeks(1);
        let entries = vec![
            entry("X", three_months_ago),
            entry("Y", three_months_ago),
            entry("Z", one_week_ago),
        ];
        let outcome = evict(&entries, now, params(10, 2));
        assert_eq!(
            outcome.removed,
            vec![
                (SetId("X".to_string()), EvictionReason::AgeExpired),
                (SetId("Y".to_string()), EvictionReason::AgeExpired),
            ]
        );
        let survivors = apply(&entries, &outcome);
        assert_eq!(survivors, vec![entry("Z", one_week_ago)]);
    }

    #[test]
    fn entries_with_unknown_age_are_never_age_evicted() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let entries = vec![LedgerEntry {
            set_id: SetId("UNKNOWN".to_string()),
            assigned_at: None,
        }];
        let outcome = evict(&entries, now, params(10, 2));
        assert!(outcome.is_empty());
    }

    #[test]
    fn exactly_at_cap_evicts_nothing() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let entries: Vec<_> = (0..10).map(|i| entry(&i.to_string(), now)).collect();
        let outcome = evict(&entries, now, params(10, 2));
        assert!(outcome.is_empty());
    }

    #[test]
    fn age_boundary_is_exclusive_not_inclusive() {
        let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
        let horizon = months_ago(now, 2);
        let entries = vec![entry("AT_HORIZON", horizon)];
        let outcome = evict(&entries, now, params(10, 2));
        assert!(
            outcome.is_empty(),
            "assignedAt == horizon must survive; only strictly older is evicted"
        );
    }

    proptest::proptest! {
        #[test]
        fn count_cap_never_leaves_more_than_max(
            n in 0usize..40,
            max_sets in 1u32..20,
        ) {
            let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
            let entries: Vec<_> = (0..n).map(|i| entry(&format!("s{i}"), now)).collect();
            let outcome = evict(&entries, now, params(max_sets, 1000));
            let survivors = apply(&entries, &outcome);
            proptest::prop_assert!(survivors.len() <= max_sets as usize);
        }

        #[test]
        fn eviction_only_removes_never_adds(
            n in 0usize..40,
            max_sets in 1u32..20,
            max_age_months in 0u32..36,
        ) {
            let now = Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap();
            let entries: Vec<_> = (0..n).map(|i| entry(&format!("s{i}"), now)).collect();
            let outcome = evict(&entries, now, params(max_sets, max_age_months));
            let survivors = apply(&entries, &outcome);
            let survivor_ids: std::collections::HashSet<_> =
                survivors.iter().map(|e| e.set_id.clone()).collect();
            let original_ids: std::collections::HashSet<_> =
                entries.iter().map(|e| e.set_id.clone()).collect();
            proptest::prop_assert!(survivor_ids.is_subset(&original_ids));
        }
    }
}
