//! In-memory [`ContentStore`], for tests and local/dev use.

use std::collections::BTreeMap;
use std::sync::RwLock;

use qs_types::{CategoryId, ContentHash, Item, ItemId};

use crate::{ContentStore, ItemKey, PutBatchOutcome, StoreError};

#[derive(Default)]
struct Inner {
    by_id: BTreeMap<ItemId, Item>,
    by_hash: BTreeMap<ContentHash, Vec<ItemId>>,
    by_category: BTreeMap<CategoryId, BTreeMap<ItemId, ()>>,
}

/// An in-memory content store guarded by a single `RwLock`.
#[derive(Default)]
pub struct InMemoryContentStore {
    inner: RwLock<Inner>,
}

impl InMemoryContentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put_batch(&self, items: Vec<Item>) -> Result<PutBatchOutcome, StoreError> {
        let mut inner = self.inner.write().expect("content store lock poisoned");
        let mut outcome = PutBatchOutcome::default();
        for item in items {
            if inner.by_hash.contains_key(&item.hash) {
                outcome.skipped_duplicate_by_hash += 1;
                continue;
            }
            inner
                .by_category
                .entry(item.category_id.clone())
                .or_default()
                .insert(item.id.clone(), ());
            inner.by_hash.entry(item.hash.clone()).or_default().push(item.id.clone());
            inner.by_id.insert(item.id.clone(), item);
            outcome.stored += 1;
        }
        Ok(outcome)
    }

    async fn get_batch(&self, keys: &[ItemKey]) -> Result<Vec<Item>, StoreError> {
        let inner = self.inner.read().expect("content store lock poisoned");
        Ok(keys
            .iter()
            .filter_map(|key| inner.by_id.get(&key.id))
            .filter(|item| {
                keys.iter()
                    .any(|key| key.id == item.id && key.hash == item.hash)
            })
            .cloned()
            .collect())
    }

    async fn query_by_category(&self, category: &CategoryId, after_id: Option<&ItemId>) -> Result<Vec<Item>, StoreError> {
        let inner = self.inner.read().expect("content store lock poisoned");
        let Some(ids) = inner.by_category.get(category) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .keys()
            .filter(|id| match after_id {
                Some(after) => *id > after,
                None => true,
            })
            .filter_map(|id| inner.by_id.get(id))
            .cloned()
            .collect())
    }

    async fn query_by_hash(&self, hash: &ContentHash) -> Result<Vec<Item>, StoreError> {
        let inner = self.inner.read().expect("content store lock poisoned");
        Ok(inner
            .by_hash
            .get(hash)
            .map(|ids| ids.iter().filter_map(|id| inner.by_id.get(id)).cloned().collect())
            .unwrap_or_default())
    }
}
