//! In-memory [`LedgerStore`], used by tests and single-node deployments.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use qs_eviction::EvictionOutcome;
use qs_types::{CategoryId, LedgerEntry, SetId, UserId};

use crate::{CategoryMetadata, LedgerError, LedgerStore, UserMetadata};

#[derive(Default)]
struct Record {
    entries: Vec<LedgerEntry>,
    meta: CategoryMetadata,
}

/// A `DashMap`-backed ledger. Each `(user, category)` pair's record is
/// guarded individually, and a secondary per-user category index keeps
/// `categories_for_user` from requiring a full scan.
#[derive(Default)]
pub struct InMemoryLedgerStore {
    records: DashMap<(UserId, CategoryId), RwLock<Record>>,
    user_categories: DashMap<UserId, BTreeSet<CategoryId>>,
    user_last_updated: DashMap<UserId, DateTime<Utc>>,
}

impl InMemoryLedgerStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn read(&self, user: &UserId, category: &CategoryId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let key = (user.clone(), category.clone());
        Ok(self
            .records
            .get(&key)
            .map(|r| r.read().expect("ledger record lock poisoned").entries.clone())
            .unwrap_or_default())
    }

    async fn categories_for_user(&self, user: &UserId) -> Result<Vec<CategoryId>, LedgerError> {
        Ok(self
            .user_categories
            .get(user)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn apply_eviction(
        &self,
        user: &UserId,
        category: &CategoryId,
        outcome: &EvictionOutcome,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        let key = (user.clone(), category.clone());
        let Some(record_lock) = self.records.get(&key) else {
            return Ok(Vec::new());
        };
        let mut record = record_lock.write().expect("ledger record lock poisoned");
        if outcome.is_empty() {
            return Ok(record.entries.clone());
        }
        record.entries = qs_eviction::apply(&record.entries, outcome);
        record.meta.count = record.entries.len();
        record.meta.evicted_count += outcome.removed_count() as u64;
        record.meta.evicted_at = Some(now);
        record.meta.last_updated = Some(now);
        let survivors = record.entries.clone();
        drop(record);

        self.user_last_updated.insert(user.clone(), now);
        if survivors.is_empty() {
            drop(record_lock);
            self.records.remove(&key);
            if let Some(mut cats) = self.user_categories.get_mut(user) {
                cats.remove(category);
            }
        }
        Ok(survivors)
    }

    async fn append(
        &self,
        user: &UserId,
        category: &CategoryId,
        set_id: SetId,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let key = (user.clone(), category.clone());
        let record_lock = self.records.entry(key).or_default();
        let mut record = record_lock.write().expect("ledger record lock poisoned");
        if record.entries.iter().any(|e| e.set_id == set_id) {
            return Err(LedgerError::InvariantViolation(format!(
                "set {set_id} already present in ledger for user {user} category {category}"
            )));
        }
        record.entries.push(LedgerEntry {
            set_id,
            assigned_at: Some(now),
        });
        record.meta.count = record.entries.len();
        record.meta.last_assigned = Some(now);
        record.meta.last_updated = Some(now);
        drop(record);

        self.user_categories
            .entry(user.clone())
            .or_default()
            .insert(category.clone());
        self.user_last_updated.insert(user.clone(), now);
        Ok(())
    }

    async fn metadata(&self, user: &UserId) -> Result<UserMetadata, LedgerError> {
        let mut categories = BTreeMap::new();
        if let Some(cats) = self.user_categories.get(user) {
            for category in cats.iter() {
                let key = (user.clone(), category.clone());
                if let Some(record) = self.records.get(&key) {
                    categories.insert(
                        category.clone(),
                        record.read().expect("ledger record lock poisoned").meta.clone(),
                    );
                }
            }
        }
        Ok(UserMetadata {
            last_updated: self.user_last_updated.get(user).map(|v| *v),
            categories,
        })
    }

    async fn reset_user(&self, user: &UserId) -> Result<(), LedgerError> {
        if let Some((_, cats)) = self.user_categories.remove(user) {
            for category in cats {
                self.records.remove(&(user.clone(), category));
            }
        }
        self.user_last_updated.remove(user);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use qs_eviction::EvictionReason;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn append_then_read_round_trips() {
        let store = InMemoryLedgerStore::new();
        let user = UserId("u1".into());
        let cat = CategoryId("cat-x".into());
        store.append(&user, &cat, SetId("S1".into()), now()).await.unwrap();
        let entries = store.read(&user, &cat).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].set_id, SetId("S1".into()));
    }

    #[tokio::test]
    async fn duplicate_append_is_invariant_violation() {
        let store = InMemoryLedgerStore::new();
        let user = UserId("u1".into());
        let cat = CategoryId("cat-x".into());
        store.append(&user, &cat, SetId("S1".into()), now()).await.unwrap();
        let err = store.append(&user, &cat, SetId("S1".into()), now()).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvariantViolation(_)));
    }

    #[tokio::test]
    async fn eviction_empties_category_and_removes_index_entry() {
        let store = InMemoryLedgerStore::new();
        let user = UserId("u1".into());
        let cat = CategoryId("cat-x".into());
        store.append(&user, &cat, SetId("S1".into()), now()).await.unwrap();

        let outcome = EvictionOutcome {
            removed: vec![(SetId("S1".into()), EvictionReason::ExceededCap)],
        };
        let survivors = store.apply_eviction(&user, &cat, &outcome, now()).await.unwrap();
        assert!(survivors.is_empty());
        assert!(store.categories_for_user(&user).await.unwrap().is_empty());

        let meta = store.metadata(&user).await.unwrap();
        assert!(meta.categories.is_empty());
    }

    #[tokio::test]
    async fn reset_user_clears_every_category() {
        let store = InMemoryLedgerStore::new();
        let user = UserId("u1".into());
        store
            .append(&user, &CategoryId("a".into()), SetId("S1".into()), now())
            .await
            .unwrap();
        store
            .append(&user, &CategoryId("b".into()), SetId("S2".into()), now())
            .await
            .unwrap();
        store.reset_user(&user).await.unwrap();
        assert!(store.categories_for_user(&user).await.unwrap().is_empty());
        assert!(store.read(&user, &CategoryId("a".into())).await.unwrap().is_empty());
    }
}
