// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! The Allocation Ledger (component D): a per-user, per-category durable
//! record of which sets have been assigned, with an individual timestamp
//! per assignment.
//!
//! This crate defines the [`LedgerStore`] trait and two implementations:
//! [`memory::InMemoryLedgerStore`] for tests and single-node use, and
//! [`redis::RedisLedgerStore`] for the Redis-shaped keys described in the
//! operations surface (`alloc:<userId>`, `alloc:meta:<userId>`,
//! `alloc:ts:<userId>`). Per-(user, category) serialization across the
//! read-evict-append sequence is the caller's responsibility (`qs-allocator`
//! holds a striped lock keyed by user id for the duration) — store
//! implementations only need each individual call to be atomic.

pub mod memory;
pub mod redis;

pub use redis::RedisLedgerStore;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use qs_eviction::EvictionOutcome;
use qs_types::{CategoryId, LedgerEntry, SetId, UserId};
use thiserror::Error;

/// Errors surfaced by a [`LedgerStore`].
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backing store could not be read or written.
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
    /// A call did not complete before its deadline.
    #[error("ledger call timed out")]
    Timeout,
    /// A scan or write observed a ledger in a state the core's own
    /// invariants rule out (e.g. a set-id appearing twice in one list).
    /// Indicates a serialization bug upstream; must abort and alert, never
    /// be silently repaired.
    #[error("ledger invariant violated: {0}")]
    InvariantViolation(String),
}

/// Per-category metadata tracked alongside the entry list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CategoryMetadata {
    /// Number of sets currently assigned; always equal to the entry list's
    /// length.
    pub count: usize,
    /// Timestamp of the most recent successful append for this category.
    pub last_assigned: Option<DateTime<Utc>>,
    /// Timestamp of the most recent mutation (append or eviction) for this
    /// category.
    pub last_updated: Option<DateTime<Utc>>,
    /// Running total of sets ever evicted from this category.
    pub evicted_count: u64,
    /// Timestamp of the most recent eviction, if any.
    pub evicted_at: Option<DateTime<Utc>>,
}

/// Per-user metadata: a `last_updated` timestamp plus one
/// [`CategoryMetadata`] per category the user has ever touched.
///
/// Per the recorded open-question decision (see `SPEC_FULL.md` §9), only
/// the per-set `assigned_at` timestamps are authoritative for eviction;
/// `last_updated` here is observability metadata and is never read by
/// `qs-eviction`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserMetadata {
    /// Timestamp of the most recent mutation across any category.
    pub last_updated: Option<DateTime<Utc>>,
    /// Per-category metadata, keyed by category id.
    pub categories: BTreeMap<CategoryId, CategoryMetadata>,
}

/// The Allocation Ledger's storage contract.
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns the user's current set-id list for `category`, oldest first,
    /// with each entry's assignment timestamp. Empty if the user has never
    /// been allocated anything in this category.
    async fn read(&self, user: &UserId, category: &CategoryId) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Every category id the user currently has a non-empty list for, used
    /// by `evict_user` to iterate without the caller needing to know the
    /// category table.
    async fn categories_for_user(&self, user: &UserId) -> Result<Vec<CategoryId>, LedgerError>;

    /// Atomically removes every set-id named in `outcome` from the user's
    /// list for `category`, deletes their timestamp entries, bumps
    /// `evicted_count`/`evicted_at`, and deletes the category entry
    /// entirely if the list becomes empty. Returns the surviving entries.
    /// A no-op (returning the current list unchanged) if `outcome` is empty.
    async fn apply_eviction(
        &self,
        user: &UserId,
        category: &CategoryId,
        outcome: &EvictionOutcome,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError>;

    /// Appends `set_id` to the user's list for `category` with assignment
    /// timestamp `now`, bumping `count`, `last_assigned`, `last_updated`,
    /// and the per-user `last_updated`. Returns
    /// [`LedgerError::InvariantViolation`] if `set_id` is already present —
    /// the allocator never intentionally does this, so a duplicate
    /// indicates a serialization bug rather than something to repair here.
    async fn append(
        &self,
        user: &UserId,
        category: &CategoryId,
        set_id: SetId,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError>;

    /// Returns the user's full metadata snapshot.
    async fn metadata(&self, user: &UserId) -> Result<UserMetadata, LedgerError>;

    /// Administrative: clears the user's entire record across every
    /// category.
    async fn reset_user(&self, user: &UserId) -> Result<(), LedgerError>;
}
