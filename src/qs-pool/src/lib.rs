// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! The Pool Index (component C): a per-category FIFO of built set-ids.
//!
//! A set-id stays in the pool until administratively drained; the
//! allocator only ever reads it (via [`PoolStore::peek_all`]), never
//! removes from it. This is what lets many users draw disjoint views of
//! the same pool without contending on a shared structure — per-user
//! uniqueness is enforced upstream by filtering against the ledger, not
//! by removing from the pool.

pub mod memory;
pub mod redis;

pub use redis::RedisPoolStore;

use chrono::{DateTime, Utc};
use qs_types::{CategoryId, SetId};
use thiserror::Error;

/// Errors surfaced by a [`PoolStore`].
#[derive(Debug, Error)]
pub enum PoolError {
    /// The backing store could not be read or written.
    #[error("pool store unavailable: {0}")]
    Unavailable(String),
    /// A call did not complete before its deadline.
    #[error("pool call timed out")]
    Timeout,
}

/// Per-category metadata maintained alongside the queue.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolMetadata {
    /// Number of set-ids currently enqueued for this category.
    pub available: usize,
    /// Timestamp of the most recent mutation (enqueue, dequeue, or drop).
    pub last_updated: Option<DateTime<Utc>>,
    /// Size of the most recent `enqueue` batch.
    pub last_batch_size: usize,
}

/// The Pool Index's storage contract. Every operation is atomic at the
/// category level; there is no ordering guarantee across categories.
#[async_trait::async_trait]
pub trait PoolStore: Send + Sync {
    /// Appends `set_ids` to the tail of `category`'s queue and updates its
    /// metadata in the same atomic step.
    async fn enqueue(&self, category: &CategoryId, set_ids: Vec<SetId>, now: DateTime<Utc>) -> Result<(), PoolError>;

    /// Non-destructive read of the full queue for `category`, oldest
    /// (build order) first. Used by the allocator.
    async fn peek_all(&self, category: &CategoryId) -> Result<Vec<SetId>, PoolError>;

    /// Destructive pop of the oldest set-id in `category`, if any. Used by
    /// administrative drains, never by the allocator.
    async fn dequeue_one(&self, category: &CategoryId, now: DateTime<Utc>) -> Result<Option<SetId>, PoolError>;

    /// Clears `category`'s entire queue.
    async fn drop_category(&self, category: &CategoryId, now: DateTime<Utc>) -> Result<(), PoolError>;

    /// Returns `category`'s current metadata snapshot.
    async fn metadata(&self, category: &CategoryId) -> Result<PoolMetadata, PoolError>;
}
