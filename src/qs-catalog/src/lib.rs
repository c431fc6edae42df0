// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! The Set Catalog (component B): durable storage for built sets, plus
//! the per-category watermark the Builder uses to avoid re-reading items
//! it has already partitioned.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use qs_types::{CategoryId, ItemId, Set, SetId};
use thiserror::Error;

/// Errors surfaced by a [`SetCatalog`].
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The backing store could not be read or written.
    #[error("set catalog unavailable: {0}")]
    Unavailable(String),
    /// A call did not complete before its deadline.
    #[error("set catalog call timed out")]
    Timeout,
}

/// The Set Catalog's storage contract.
#[async_trait]
pub trait SetCatalog: Send + Sync {
    /// Durably records a newly built set. The Builder is the only writer.
    async fn put(&self, set: Set) -> Result<(), CatalogError>;

    /// Returns the highest item-id that has been folded into any set
    /// built for `category`, or `None` if the category has never been
    /// built. The Builder reads the Content Store strictly after this
    /// watermark on its next run.
    async fn get_latest_watermark(&self, category: &CategoryId) -> Result<Option<ItemId>, CatalogError>;

    /// Returns a single set by id, if known.
    async fn get(&self, set_id: &SetId) -> Result<Option<Set>, CatalogError>;

    /// Returns every set named in `set_ids` that exists, silently
    /// omitting misses. Order is not guaranteed to follow the input.
    async fn get_batch(&self, set_ids: &[SetId]) -> Result<Vec<Set>, CatalogError>;

    /// Returns every set-id ever recorded for `category`, oldest (by
    /// watermark, then set-id) first. The Builder uses this — not the
    /// watermark — to find catalog sets that never made it into the pool
    /// after a crash between the catalog write and the pool enqueue in a
    /// prior run, since the watermark itself has already advanced past
    /// them by the time a later run would otherwise look.
    async fn list_set_ids(&self, category: &CategoryId) -> Result<Vec<SetId>, CatalogError>;
}
