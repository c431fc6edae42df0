// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! The Set Builder (component G): partitions unseen items into
//! fixed-size sets and enqueues them onto the pool.
//!
//! Single-writer per category: concurrent `build` calls on the same
//! category would otherwise both read the same watermark and double-
//! consume items past it, so every category's six-step run is serialized
//! behind a sharded lock keyed by category id — the same striping used
//! for per-user serialization in `qs-allocator`.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use qs_catalog::{CatalogError, SetCatalog};
use qs_pool::{PoolError, PoolStore};
use qs_store::{ContentStore, StoreError};
use qs_types::{CategoryId, ItemRef, Set, SetId, StripedLocks};
use thiserror::Error;

/// Errors surfaced by [`Builder::build`].
#[derive(Debug, Error)]
pub enum BuilderError {
    /// The Content Store could not be read.
    #[error("content store unavailable: {0}")]
    StoreUnavailable(String),
    /// The Set Catalog could not be written. Aborts the batch for that
    /// category; unlike a pool-enqueue failure, this is not safely
    /// retryable within the same run.
    #[error("set catalog unavailable: {0}")]
    CatalogUnavailable(String),
    /// The Pool could not be read or written. Logged and skipped, per
    /// spec — a pool failure never aborts the batch.
    #[error("pool unavailable: {0}")]
    PoolUnavailable(String),
}

impl From<PoolError> for BuilderError {
    fn from(e: PoolError) -> Self {
        match e {
            PoolError::Unavailable(msg) => BuilderError::PoolUnavailable(msg),
            PoolError::Timeout => BuilderError::PoolUnavailable("timed out".to_string()),
        }
    }
}

impl From<StoreError> for BuilderError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(msg) => BuilderError::StoreUnavailable(msg),
            StoreError::Timeout => BuilderError::StoreUnavailable("timed out".to_string()),
        }
    }
}

impl From<CatalogError> for BuilderError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Unavailable(msg) => BuilderError::CatalogUnavailable(msg),
            CatalogError::Timeout => BuilderError::CatalogUnavailable("timed out".to_string()),
        }
    }
}

/// Outcome of a single category's build step, as returned inside a
/// [`BuildReport`]. A machine-readable summary rather than a bare count,
/// since the admin CLI prints it and tests assert on it directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryBuildOutcome {
    /// The category this outcome covers.
    pub category: CategoryId,
    /// Number of sets produced this run.
    pub produced: usize,
    /// `true` if fewer than one full set's worth of new items was
    /// available (nothing was produced, but the category wasn't
    /// necessarily empty — a shortfall, not a failure).
    pub shortfall: bool,
    /// The new watermark if any sets were produced, else the prior one.
    pub watermark: Option<qs_types::ItemId>,
}

/// Structured summary of a `build` call across every requested category.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Per-category outcomes, in the order categories were processed.
    pub categories: Vec<CategoryBuildOutcome>,
}

impl BuildReport {
    /// Total sets produced across all categories.
    pub fn total_produced(&self) -> usize {
        self.categories.iter().map(|c| c.produced).sum()
    }
}

/// The Set Builder.
pub struct Builder {
    store: Arc<dyn ContentStore>,
    catalog: Arc<dyn SetCatalog>,
    pool: Arc<dyn PoolStore>,
    locks: StripedLocks,
    id_gen: Box<dyn Fn() -> SetId + Send + Sync>,
}

impl Builder {
    /// Builds a `Builder` whose set-ids are fresh UUIDv4s.
    pub fn new(store: Arc<dyn ContentStore>, catalog: Arc<dyn SetCatalog>, pool: Arc<dyn PoolStore>) -> Self {
        Self::with_id_generator(store, catalog, pool, || SetId(uuid::Uuid::new_v4().to_string()))
    }

    /// As [`Self::new`], but sourcing set-ids from `id_gen` — lets tests
    /// assert on exact, deterministic set-ids instead of random UUIDs.
    pub fn with_id_generator(
        store: Arc<dyn ContentStore>,
        catalog: Arc<dyn SetCatalog>,
        pool: Arc<dyn PoolStore>,
        id_gen: impl Fn() -> SetId + Send + Sync + 'static,
    ) -> Self {
        Self {
            store,
            catalog,
            pool,
            locks: StripedLocks::new(32),
            id_gen: Box::new(id_gen),
        }
    }

    /// Runs the six-step build algorithm over every category in
    /// `categories`, producing up to `num_sets_per_category` sets of
    /// exactly `items_per_set` refs each.
    pub async fn build(
        &self,
        categories: &[CategoryId],
        num_sets_per_category: usize,
        items_per_set: usize,
    ) -> BuildReport {
        let mut report = BuildReport::default();
        for category in categories {
            match self.build_category(category, num_sets_per_category, items_per_set).await {
                Ok(outcome) => report.categories.push(outcome),
                Err(e) => {
                    tracing::error!(category = %category, error = %e, "build aborted for category");
                }
            }
        }
        report
    }

    async fn build_category(
        &self,
        category: &CategoryId,
        num_sets_per_category: usize,
        items_per_set: usize,
    ) -> Result<CategoryBuildOutcome, BuilderError> {
        let _guard = self.locks.lock(category).await;

        // Recover from a prior run that wrote the catalog entry but crashed
        // or errored before the pool enqueue: the watermark already moved
        // past those items, so only a scan of catalog vs. pool membership
        // (not the watermark) can find them.
        if let Err(e) = self.reconcile_unenqueued(category).await {
            tracing::warn!(category = %category, error = %e, "catalog/pool reconciliation failed; continuing with this run's new sets only");
        }

        let watermark = self.catalog.get_latest_watermark(category).await?;
        let items = self.store.query_by_category(category, watermark.as_ref()).await?;

        let n = num_sets_per_category.min(items.len() / items_per_set.max(1));
        if n == 0 {
            tracing::info!(category = %category, available = items.len(), items_per_set, "build shortfall: not enough new items for a full set");
            return Ok(CategoryBuildOutcome {
                category: category.clone(),
                produced: 0,
                shortfall: true,
                watermark,
            });
        }

        let consumed = &items[..n * items_per_set];
        let new_watermark = consumed
            .last()
            .map(|item| item.id.clone())
            .expect("n > 0 implies consumed is non-empty");

        let now = Utc::now();
        let mut set_ids = Vec::with_capacity(n);
        for chunk in consumed.chunks(items_per_set) {
            let refs: Vec<ItemRef> = chunk
                .iter()
                .map(|item| ItemRef {
                    id: item.id.clone(),
                    hash: item.hash.clone(),
                })
                .collect();
            let set_id = (self.id_gen)();
            let set = Set {
                set_id: set_id.clone(),
                category_id: category.clone(),
                refs,
                created_at: now,
                watermark: new_watermark.clone(),
            };
            self.catalog.put(set).await?;
            set_ids.push(set_id);
        }

        if let Err(e) = self.enqueue_known(category, set_ids, now).await {
            tracing::warn!(category = %category, error = %e, "pool enqueue failed; sets remain in catalog for a future re-enqueue");
        }

        Ok(CategoryBuildOutcome {
            category: category.clone(),
            produced: n,
            shortfall: false,
            watermark: Some(new_watermark),
        })
    }

    /// Enqueues `set_ids` onto the pool, skipping any already present —
    /// the guard that makes re-running a build after a crashed enqueue
    /// safe (at-least-once, never duplicated).
    async fn enqueue_known(&self, category: &CategoryId, set_ids: Vec<SetId>, now: chrono::DateTime<Utc>) -> Result<(), PoolError> {
        let already_in_pool: BTreeSet<SetId> = self.pool.peek_all(category).await?.into_iter().collect();
        let fresh: Vec<SetId> = set_ids.into_iter().filter(|id| !already_in_pool.contains(id)).collect();
        if fresh.is_empty() {
            return Ok(());
        }
        self.pool.enqueue(category, fresh, now).await
    }

    /// Finds catalog sets for `category` that never made it into the pool
    /// and enqueues them, oldest (watermark order) first. A no-op in the
    /// common case where every catalog set is already offerable.
    async fn reconcile_unenqueued(&self, category: &CategoryId) -> Result<(), BuilderError> {
        let cataloged = self.catalog.list_set_ids(category).await?;
        if cataloged.is_empty() {
            return Ok(());
        }
        let pooled: BTreeSet<SetId> = self.pool.peek_all(category).await?.into_iter().collect();
        let missing: Vec<SetId> = cataloged.into_iter().filter(|id| !pooled.contains(id)).collect();
        if missing.is_empty() {
            return Ok(());
        }
        tracing::info!(category = %category, count = missing.len(), "re-enqueuing catalog sets missed by a prior pool enqueue");
        self.pool.enqueue(category, missing, Utc::now()).await?;
        Ok(())
    }
}
