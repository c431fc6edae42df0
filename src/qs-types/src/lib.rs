// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! Shared data model for the question-set allocation engine: items, sets,
//! category/user identifiers, and a couple of small concurrency primitives
//! (`StripedLocks`, `months_ago`) that every other `qs-*` crate builds on.
//!
//! This crate holds types only. It has no opinion about how an `Item` is
//! stored or how a `Set` is built; see `qs-store`, `qs-catalog`, `qs-pool`,
//! and `qs-ledger` for that.

#![warn(missing_docs)]

mod ids;
mod item;
mod ledger;
mod lock;
mod set;
mod time;

pub use ids::{CategoryId, ContentHash, ItemId, SetId, UserId};
pub use item::{Item, ItemRef};
pub use ledger::LedgerEntry;
pub use lock::StripedLocks;
pub use set::Set;
pub use time::months_ago;
