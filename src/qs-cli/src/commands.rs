// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! Implementations of each admin subcommand. Kept separate from `main.rs`
//! so the exit-code mapping in `main` stays a thin dispatch over this
//! module's `Result<(), CliError>`.

use chrono::{DateTime, Utc};
use qs_ledger::LedgerStore;
use qs_pool::PoolStore;
use qs_types::{CategoryId, UserId};
use thiserror::Error;

/// Collapses every backend-specific error into the two kinds the
/// operations surface's exit-code contract distinguishes.
#[derive(Debug, Error)]
pub enum CliError {
    /// Malformed input — exit code `1`.
    #[error("{0}")]
    Validation(String),
    /// The ledger or pool store could not be reached — exit code `2`.
    #[error("{0}")]
    Backend(String),
}

impl From<qs_ledger::LedgerError> for CliError {
    fn from(e: qs_ledger::LedgerError) -> Self {
        CliError::Backend(e.to_string())
    }
}

impl From<qs_pool::PoolError> for CliError {
    fn from(e: qs_pool::PoolError) -> Self {
        CliError::Backend(e.to_string())
    }
}

/// Pops every set-id off `category`'s pool, printing each as it drains —
/// the only destructive, operator-driven way to shrink a pool (the
/// allocator itself never removes from it).
pub async fn drain(pool: &dyn PoolStore, category: &CategoryId, now: DateTime<Utc>) -> Result<(), CliError> {
    let mut drained = 0usize;
    while let Some(set_id) = pool.dequeue_one(category, now).await? {
        println!("{set_id}");
        drained += 1;
    }
    eprintln!("drained {drained} set-id(s) from {category}");
    Ok(())
}

/// Clears a user's entire ledger record across every category.
pub async fn reset_user(ledger: &dyn LedgerStore, user: &UserId) -> Result<(), CliError> {
    ledger.reset_user(user).await?;
    eprintln!("reset ledger for user {user}");
    Ok(())
}

/// Runs the eviction policy against every category the user currently
/// holds allocations in — the manual/admin-triggered equivalent of a
/// background sweep, since no scheduler exists in `qs-server` (spec.md
/// §9 leaves a background sweep to operators; this is that lever).
pub async fn evict_user(ledger: &dyn LedgerStore, user: &UserId, now: DateTime<Utc>) -> Result<(), CliError> {
    let categories = ledger.categories_for_user(user).await?;
    let params = qs_dyncfg::EvictionParams::current();
    let mut total_evicted = 0usize;
    for category in &categories {
        let entries = ledger.read(user, category).await?;
        let outcome = qs_eviction::evict(&entries, now, params);
        if outcome.is_empty() {
            continue;
        }
        total_evicted += outcome.removed_count();
        ledger.apply_eviction(user, category, &outcome, now).await?;
    }
    eprintln!("evicted {total_evicted} set-id(s) across {} categor(y/ies) for user {user}", categories.len());
    Ok(())
}

/// Prints every runtime-mutable configuration knob and its current value.
pub fn list_config() -> Result<(), CliError> {
    for (name, description, default, current) in qs_dyncfg::all_configs().list() {
        println!("{name} = {current} (default {default}) -- {description}");
    }
    Ok(())
}

/// Updates a single runtime-mutable configuration knob by name.
pub fn set_config(key: &str, value: u32) -> Result<(), CliError> {
    qs_dyncfg::all_configs()
        .set(key, value)
        .map_err(|e| CliError::Validation(e.to_string()))?;
    eprintln!("{key} = {value}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qs_ledger::memory::InMemoryLedgerStore;
    use qs_pool::memory::InMemoryPoolStore;
    use qs_types::SetId;

    #[tokio::test]
    async fn drain_pops_every_entry_in_fifo_order() {
        let pool = InMemoryPoolStore::new();
        let cat = CategoryId("cat-X".into());
        let now = Utc::now();
        pool.enqueue(&cat, vec![SetId("S1".into()), SetId("S2".into())], now)
            .await
            .unwrap();

        drain(&pool, &cat, now).await.unwrap();
        assert!(pool.peek_all(&cat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reset_user_clears_every_category() {
        let ledger = InMemoryLedgerStore::new();
        let user = UserId("U".into());
        let cat = CategoryId("cat-X".into());
        ledger.append(&user, &cat, SetId("S1".into()), Utc::now()).await.unwrap();

        reset_user(&ledger, &user).await.unwrap();
        assert!(ledger.read(&user, &cat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn evict_user_applies_count_cap_across_all_categories() {
        let ledger = InMemoryLedgerStore::new();
        let user = UserId("U".into());
        let cat = CategoryId("cat-X".into());
        let now = Utc::now();
        for id in ["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K"] {
            ledger.append(&user, &cat, SetId(id.into()), now).await.unwrap();
        }

        evict_user(&ledger, &user, now).await.unwrap();
        let remaining = ledger.read(&user, &cat).await.unwrap();
        assert_eq!(remaining.len(), 10, "default max_sets_per_category is 10");
    }
}
