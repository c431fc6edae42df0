//! In-memory [`PoolStore`], sharded per category behind a `RwLock` so
//! `peek_all` (the allocator's hot path) never blocks on writers to other
//! categories.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use qs_types::{CategoryId, SetId};

use crate::{PoolError, PoolMetadata, PoolStore};

#[derive(Default)]
struct Queue {
    ids: Vec<SetId>,
    meta: PoolMetadata,
}

/// A `DashMap`-backed pool, one `RwLock<Queue>` per category.
#[derive(Default)]
pub struct InMemoryPoolStore {
    categories: DashMap<CategoryId, RwLock<Queue>>,
}

impl InMemoryPoolStore {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PoolStore for InMemoryPoolStore {
    async fn enqueue(&self, category: &CategoryId, set_ids: Vec<SetId>, now: DateTime<Utc>) -> Result<(), PoolError> {
        let entry = self.categories.entry(category.clone()).or_default();
        let mut queue = entry.write().expect("pool queue lock poisoned");
        let batch_size = set_ids.len();
        queue.ids.extend(set_ids);
        queue.meta.available = queue.ids.len();
        queue.meta.last_updated = Some(now);
        queue.meta.last_batch_size = batch_size;
        Ok(())
    }

    async fn peek_all(&self, category: &CategoryId) -> Result<Vec<SetId>, PoolError> {
        Ok(self
            .categories
            .get(category)
            .map(|q| q.read().expect("pool queue lock poisoned").ids.clone())
            .unwrap_or_default())
    }

    async fn dequeue_one(&self, category: &CategoryId, now: DateTime<Utc>) -> Result<Option<SetId>, PoolError> {
        let Some(entry) = self.categories.get(category) else {
            return Ok(None);
        };
        let mut queue = entry.write().expect("pool queue lock poisoned");
        if queue.ids.is_empty() {
            return Ok(None);
        }
        let popped = queue.ids.remove(0);
        queue.meta.available = queue.ids.len();
        queue.meta.last_updated = Some(now);
        Ok(Some(popped))
    }

    async fn drop_category(&self, category: &CategoryId, now: DateTime<Utc>) -> Result<(), PoolError> {
        if let Some(entry) = self.categories.get(category) {
            let mut queue = entry.write().expect("pool queue lock poisoned");
            queue.ids.clear();
            queue.meta.available = 0;
            queue.meta.last_updated = Some(now);
        }
        Ok(())
    }

    async fn metadata(&self, category: &CategoryId) -> Result<PoolMetadata, PoolError> {
        Ok(self
            .categories
            .get(category)
            .map(|q| q.read().expect("pool queue lock poisoned").meta.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn enqueue_then_peek_preserves_fifo_order() {
        let store = InMemoryPoolStore::new();
        let cat = CategoryId("cat-x".into());
        store
            .enqueue(&cat, vec![SetId("S1".into()), SetId("S2".into())], now())
            .await
            .unwrap();
        store.enqueue(&cat, vec![SetId("S3".into())], now()).await.unwrap();
        assert_eq!(
            store.peek_all(&cat).await.unwrap(),
            vec![SetId("S1".into()), SetId("S2".into()), SetId("S3".into())]
        );
        let meta = store.metadata(&cat).await.unwrap();
        assert_eq!(meta.available, 3);
        assert_eq!(meta.last_batch_size, 1);
    }

    #[tokio::test]
    async fn dequeue_one_pops_oldest_and_does_not_affect_other_categories() {
        let store = InMemoryPoolStore::new();
        let cat_a = CategoryId("a".into());
        let cat_b = CategoryId("b".into());
        store.enqueue(&cat_a, vec![SetId("S1".into()), SetId("S2".into())], now()).await.unwrap();
        store.enqueue(&cat_b, vec![SetId("T1".into())], now()).await.unwrap();

        let popped = store.dequeue_one(&cat_a, now()).await.unwrap();
        assert_eq!(popped, Some(SetId("S1".into())));
        assert_eq!(store.peek_all(&cat_a).await.unwrap(), vec![SetId("S2".into())]);
        assert_eq!(store.peek_all(&cat_b).await.unwrap(), vec![SetId("T1".into())]);
    }

    #[tokio::test]
    async fn drop_category_clears_queue_and_metadata_available() {
        let store = InMemoryPoolStore::new();
        let cat = CategoryId("cat-x".into());
        store.enqueue(&cat, vec![SetId("S1".into())], now()).await.unwrap();
        store.drop_category(&cat, now()).await.unwrap();
        assert!(store.peek_all(&cat).await.unwrap().is_empty());
        assert_eq!(store.metadata(&cat).await.unwrap().available, 0);
    }

    #[tokio::test]
    async fn empty_category_dequeues_none() {
        let store = InMemoryPoolStore::new();
        let cat = CategoryId("never-built".into());
        assert_eq!(store.dequeue_one(&cat, now()).await.unwrap(), None);
    }

    proptest::proptest! {
        #[test]
        fn pool_isolation_enqueue_to_one_category_never_appears_in_another(
            a_ids in proptest::collection::vec("[a-z]{1,6}", 0..10),
            b_ids in proptest::collection::vec("[a-z]{1,6}", 0..10),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let store = InMemoryPoolStore::new();
                let cat_a = CategoryId("a".into());
                let cat_b = CategoryId("b".into());
                store.enqueue(&cat_a, a_ids.iter().cloned().map(SetId).collect(), now()).await.unwrap();
                store.enqueue(&cat_b, b_ids.iter().cloned().map(SetId).collect(), now()).await.unwrap();

                let seen_a = store.peek_all(&cat_a).await.unwrap();
                let seen_b = store.peek_all(&cat_b).await.unwrap();
                proptest::prop_assert_eq!(seen_a.len(), a_ids.len());
                proptest::prop_assert_eq!(seen_b.len(), b_ids.len());
                Ok(())
            })?;
        }
    }
}
