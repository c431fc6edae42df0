// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! The Allocator (component F): draws the next set-id a user hasn't seen
//! yet in a category, running eviction first. The pool is never mutated
//! by allocation — per-user uniqueness comes from filtering the pool
//! against the ledger, not from removing entries from the pool.
//!
//! Per-user serialization across the read-evict-write sequence is this
//! crate's job: [`Allocator`] holds a [`qs_types::StripedLocks`] keyed by
//! user id so concurrent calls for the same user serialize while calls
//! for different users proceed in parallel.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use qs_dyncfg::EvictionParams;
use qs_ledger::{LedgerError, LedgerStore};
use qs_pool::{PoolError, PoolStore};
use qs_types::{CategoryId, SetId, StripedLocks, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced directly by [`Allocator::allocate_next`].
#[derive(Debug, Error)]
pub enum AllocatorError {
    /// The Ledger could not be read or written.
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),
    /// The Pool could not be read.
    #[error("pool unavailable: {0}")]
    PoolUnavailable(String),
    /// A backend call exceeded its deadline.
    #[error("backend call timed out")]
    Timeout,
    /// A store observed a state the core's own invariants rule out.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl From<LedgerError> for AllocatorError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Unavailable(msg) => AllocatorError::LedgerUnavailable(msg),
            LedgerError::Timeout => AllocatorError::Timeout,
            LedgerError::InvariantViolation(msg) => AllocatorError::InvariantViolation(msg),
        }
    }
}

impl From<PoolError> for AllocatorError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Unavailable(msg) => AllocatorError::PoolUnavailable(msg),
            PoolError::Timeout => AllocatorError::Timeout,
        }
    }
}

/// Per-category failure reason surfaced inside [`BatchOutcome::failed`].
/// A request-level [`AllocatorError`] that happens inside a batch call is
/// downgraded to one of these rather than failing the whole batch — one
/// bad category must not take down the others.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationFailure {
    /// The pool held nothing the user hadn't already been given.
    NoSetsAvailable,
    /// The Ledger could not be read or written.
    LedgerUnavailable,
    /// The Pool could not be read.
    PoolUnavailable,
    /// A backend call exceeded its deadline.
    Timeout,
    /// A store observed a state the core's own invariants rule out.
    InvariantViolation,
}

impl From<&AllocatorError> for AllocationFailure {
    fn from(e: &AllocatorError) -> Self {
        match e {
            AllocatorError::LedgerUnavailable(_) => AllocationFailure::LedgerUnavailable,
            AllocatorError::PoolUnavailable(_) => AllocationFailure::PoolUnavailable,
            AllocatorError::Timeout => AllocationFailure::Timeout,
            AllocatorError::InvariantViolation(_) => AllocationFailure::InvariantViolation,
        }
    }
}

/// Result of [`Allocator::allocate_batch`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// The user this batch was run for.
    pub user_id: UserId,
    /// Categories that yielded a set-id, and which one.
    pub successful: BTreeMap<CategoryId, SetId>,
    /// Categories that did not, and why.
    pub failed: BTreeMap<CategoryId, AllocationFailure>,
}

impl BatchOutcome {
    /// `(requested, successful, failed)` counts, matching the operations
    /// surface's `summary` object.
    pub fn summary(&self) -> (usize, usize, usize) {
        (
            self.successful.len() + self.failed.len(),
            self.successful.len(),
            self.failed.len(),
        )
    }
}

/// How long any single backend round-trip (ledger or pool) is allowed to
/// take before the call fails with [`AllocatorError::Timeout`].
#[derive(Clone, Copy, Debug)]
pub struct AllocatorConfig {
    /// Per-call deadline.
    pub call_timeout: Duration,
    /// Number of stripes in the per-user lock map.
    pub lock_stripes: usize,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(5),
            lock_stripes: 64,
        }
    }
}

/// The Allocator: composes the Ledger, the Pool, and the Eviction Policy
/// behind a per-user striped lock.
pub struct Allocator {
    ledger: Arc<dyn LedgerStore>,
    pool: Arc<dyn PoolStore>,
    locks: StripedLocks,
    config: AllocatorConfig,
    eviction_params: Box<dyn Fn() -> EvictionParams + Send + Sync>,
}

async fn with_deadline<T>(
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T, AllocatorError>>,
) -> Result<T, AllocatorError> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(AllocatorError::Timeout),
    }
}

impl Allocator {
    /// Builds an allocator over the given ledger and pool stores, reading
    /// eviction parameters from the live `qs-dyncfg` registry on every call.
    pub fn new(ledger: Arc<dyn LedgerStore>, pool: Arc<dyn PoolStore>, config: AllocatorConfig) -> Self {
        Self::with_eviction_params(ledger, pool, config, EvictionParams::current)
    }

    /// As [`Self::new`], but sourcing eviction parameters from `params_fn`
    /// instead of the global registry — lets tests exercise specific
    /// `maxSetsPerCategory`/`maxAgeMonths` combinations without mutating
    /// process-wide config that other tests might be reading concurrently.
    pub fn with_eviction_params(
        ledger: Arc<dyn LedgerStore>,
        pool: Arc<dyn PoolStore>,
        config: AllocatorConfig,
        params_fn: impl Fn() -> EvictionParams + Send + Sync + 'static,
    ) -> Self {
        Self {
            ledger,
            pool,
            locks: StripedLocks::new(config.lock_stripes),
            config,
            eviction_params: Box::new(params_fn),
        }
    }

    /// Draws the next set-id for `(user_id, category_id)` that the user
    /// has not already been given, running eviction first. Returns `Ok(None)`
    /// (not an error) if the pool holds nothing new for this user.
    ///
    /// Suspension points, in order: eviction read, eviction write, pool
    /// read, ledger append — each a single round-trip to its backing
    /// store, matching the concurrency model's five-step sequence.
    pub async fn allocate_next(&self, user_id: &UserId, category_id: &CategoryId) -> Result<Option<SetId>, AllocatorError> {
        let _guard = self.locks.lock(user_id).await;
        let now = Utc::now();
        let timeout = self.config.call_timeout;

        let current = with_deadline(timeout, async {
            self.ledger.read(user_id, category_id).await.map_err(AllocatorError::from)
        })
        .await?;

        let params = (self.eviction_params)();
        // Reserve the slot the pending append below will occupy: evicting
        // with the raw cap would let a user sitting exactly at
        // max_sets_per_category end this call with max+1 entries. The
        // standalone `evict_user` path (qs-cli) still evicts against the
        // unreserved cap — only the allocate path needs headroom for its
        // own upcoming append.
        let allocate_params = EvictionParams {
            max_sets_per_category: params.max_sets_per_category.saturating_sub(1),
            max_age_months: params.max_age_months,
        };
        let outcome = qs_eviction::evict(&current, now, allocate_params);

        let survivors = with_deadline(timeout, async {
            self.ledger
                .apply_eviction(user_id, category_id, &outcome, now)
                .await
                .map_err(AllocatorError::from)
        })
        .await?;

        let held: BTreeSet<SetId> = survivors.iter().map(|e| e.set_id.clone()).collect();

        let pool = with_deadline(timeout, async {
            self.pool.peek_all(category_id).await.map_err(AllocatorError::from)
        })
        .await?;

        let Some(next) = pool.into_iter().find(|id| !held.contains(id)) else {
            return Ok(None);
        };

        with_deadline(timeout, async {
            self.ledger
                .append(user_id, category_id, next.clone(), now)
                .await
                .map_err(AllocatorError::from)
        })
        .await?;

        Ok(Some(next))
    }

    /// Runs [`Self::allocate_next`] once per category in `category_ids`,
    /// aggregating successes and failures so one bad category does not
    /// fail the whole batch.
    pub async fn allocate_batch(&self, user_id: &UserId, category_ids: &[CategoryId]) -> BatchOutcome {
        let mut outcome = BatchOutcome {
            user_id: user_id.clone(),
            ..Default::default()
        };
        for category_id in category_ids {
            match self.allocate_next(user_id, category_id).await {
                Ok(Some(set_id)) => {
                    outcome.successful.insert(category_id.clone(), set_id);
                }
                Ok(None) => {
                    outcome.failed.insert(category_id.clone(), AllocationFailure::NoSetsAvailable);
                }
                Err(e) => {
                    tracing::warn!(user = %user_id, category = %category_id, error = %e, "allocation failed for category");
                    outcome.failed.insert(category_id.clone(), AllocationFailure::from(&e));
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qs_ledger::memory::InMemoryLedgerStore;
    use qs_pool::memory::InMemoryPoolStore;

    fn allocator() -> Allocator {
        Allocator::new(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryPoolStore::new()),
            AllocatorConfig::default(),
        )
    }

    fn allocator_with_params(max_sets: u32, max_age_months: u32) -> Allocator {
        Allocator::with_eviction_params(
            Arc::new(InMemoryLedgerStore::new()),
            Arc::new(InMemoryPoolStore::new()),
            AllocatorConfig::default(),
            move || EvictionParams {
                max_sets_per_category: max_sets,
                max_age_months,
            },
        )
    }

    async fn seed_pool(allocator: &Allocator, category: &CategoryId, ids: &[&str]) {
        allocator
            .pool
            .enqueue(category, ids.iter().map(|s| SetId(s.to_string())).collect(), Utc::now())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn scenario_1_fresh_allocation_from_full_pool() {
        let a = allocator();
        let cat = CategoryId("cat-X".into());
        seed_pool(&a, &cat, &["S1", "S2", "S3"]).await;

        let user = UserId("U".into());
        let result = a.allocate_next(&user, &cat).await.unwrap();
        assert_eq!(result, Some(SetId("S1".into())));

        let ledger_entries = a.ledger.read(&user, &cat).await.unwrap();
        assert_eq!(ledger_entries.len(), 1);
        assert_eq!(ledger_entries[0].set_id, SetId("S1".into()));

        let pool_after = a.pool.peek_all(&cat).await.unwrap();
        assert_eq!(pool_after, vec![SetId("S1".into()), SetId("S2".into()), SetId("S3".into())]);
    }

    #[tokio::test]
    async fn scenario_2_second_allocation_skips_already_held() {
        let a = allocator();
        let cat = CategoryId("cat-X".into());
        seed_pool(&a, &cat, &["S1", "S2", "S3"]).await;
        let user = UserId("U".into());
        a.allocate_next(&user, &cat).await.unwrap();

        let result = a.allocate_next(&user, &cat).await.unwrap();
        assert_eq!(result, Some(SetId("S2".into())));
        let ledger_entries = a.ledger.read(&user, &cat).await.unwrap();
        assert_eq!(
            ledger_entries.iter().map(|e| e.set_id.clone()).collect::<Vec<_>>(),
            vec![SetId("S1".into()), SetId("S2".into())]
        );
    }

    #[tokio::test]
    async fn scenario_5_pool_exhausted_returns_none_and_ledger_unchanged() {
        let a = allocator();
        let cat = CategoryId("cat-X".into());
        seed_pool(&a, &cat, &["S1", "S2"]).await;
        let user = UserId("U".into());
        a.allocate_next(&user, &cat).await.unwrap();
        a.allocate_next(&user, &cat).await.unwrap();

        let result = a.allocate_next(&user, &cat).await.unwrap();
        assert_eq!(result, None);
        let ledger_entries = a.ledger.read(&user, &cat).await.unwrap();
        assert_eq!(ledger_entries.len(), 2);
    }

    #[tokio::test]
    async fn scenario_3_count_cap_eviction_on_allocation() {
        let a = allocator_with_params(3, 1000);
        let cat = CategoryId("cat-X".into());
        let user = UserId("U".into());
        let now = Utc::now();
        for id in ["A", "B", "C"] {
            a.ledger.append(&user, &cat, SetId(id.into()), now).await.unwrap();
        }
        seed_pool(&a, &cat, &["A", "B", "C", "D", "E"]).await;

        let result = a.allocate_next(&user, &cat).await.unwrap();
        assert_eq!(result, Some(SetId("D".into())));
        let ledger_entries = a.ledger.read(&user, &cat).await.unwrap();
        assert_eq!(
            ledger_entries.iter().map(|e| e.set_id.clone()).collect::<Vec<_>>(),
            vec![SetId("B".into()), SetId("C".into()), SetId("D".into())]
        );
    }

    #[tokio::test]
    async fn scenario_4_age_cap_eviction() {
        let a = allocator_with_params(1000, 2);
        let cat = CategoryId("cat-X".into());
        let user = UserId("U".into());
        let now = Utc::now();
        let three_months_ago = qs_types::months_ago(now, 3);
        let one_week_ago = now - chrono::Duration::weeks(1);
        a.ledger.append(&user, &cat, SetId("X".into()), three_months_ago).await.unwrap();
        a.ledger.append(&user, &cat, SetId("Y".into()), three_months_ago).await.unwrap();
        a.ledger.append(&user, &cat, SetId("Z".into()), one_week_ago).await.unwrap();
        seed_pool(&a, &cat, &["X", "Y", "Z", "W"]).await;

        let result = a.allocate_next(&user, &cat).await.unwrap();
        assert_eq!(result, Some(SetId("X".into())));
        let ledger_entries = a.ledger.read(&user, &cat).await.unwrap();
        assert_eq!(
            ledger_entries.iter().map(|e| e.set_id.clone()).collect::<Vec<_>>(),
            vec![SetId("Z".into()), SetId("X".into())]
        );
    }

    #[tokio::test]
    async fn batch_aggregates_per_category_outcomes_without_failing_the_whole_call() {
        let a = allocator();
        let cat_full = CategoryId("full".into());
        let cat_empty = CategoryId("empty".into());
        seed_pool(&a, &cat_full, &["S1"]).await;

        let user = UserId("U".into());
        let outcome = a.allocate_batch(&user, &[cat_full.clone(), cat_empty.clone()]).await;
        assert_eq!(outcome.successful.get(&cat_full), Some(&SetId("S1".into())));
        assert_eq!(outcome.failed.get(&cat_empty), Some(&AllocationFailure::NoSetsAvailable));
        assert_eq!(outcome.summary(), (2, 1, 1));
    }
}
