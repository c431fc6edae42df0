//! In-memory [`SetCatalog`], for tests and local/dev use.

use std::collections::BTreeMap;
use std::sync::RwLock;

use qs_types::{CategoryId, ItemId, Set, SetId};

use crate::{CatalogError, SetCatalog};

#[derive(Default)]
struct Inner {
    sets: BTreeMap<SetId, Set>,
    watermarks: BTreeMap<CategoryId, ItemId>,
}

/// An in-memory set catalog guarded by a single `RwLock`.
#[derive(Default)]
pub struct InMemorySetCatalog {
    inner: RwLock<Inner>,
}

impl InMemorySetCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SetCatalog for InMemorySetCatalog {
    async fn put(&self, set: Set) -> Result<(), CatalogError> {
        let mut inner = self.inner.write().expect("set catalog lock poisoned");
        let bump = match inner.watermarks.get(&set.category_id) {
            Some(current) => set.watermark > *current,
            None => true,
        };
        if bump {
            inner.watermarks.insert(set.category_id.clone(), set.watermark.clone());
        }
        inner.sets.insert(set.set_id.clone(), set);
        Ok(())
    }

    async fn get_latest_watermark(&self, category: &CategoryId) -> Result<Option<ItemId>, CatalogError> {
        Ok(self
            .inner
            .read()
            .expect("set catalog lock poisoned")
            .watermarks
            .get(category)
            .cloned())
    }

    async fn get(&self, set_id: &SetId) -> Result<Option<Set>, CatalogError> {
        Ok(self.inner.read().expect("set catalog lock poisoned").sets.get(set_id).cloned())
    }

    async fn get_batch(&self, set_ids: &[SetId]) -> Result<Vec<Set>, CatalogError> {
        let inner = self.inner.read().expect("set catalog lock poisoned");
        Ok(set_ids.iter().filter_map(|id| inner.sets.get(id)).cloned().collect())
    }

    async fn list_set_ids(&self, category: &CategoryId) -> Result<Vec<SetId>, CatalogError> {
        let inner = self.inner.read().expect("set catalog lock poisoned");
        let mut found: Vec<&Set> = inner.sets.values().filter(|s| &s.category_id == category).collect();
        found.sort_by(|a, b| (a.watermark.clone(), a.set_id.clone()).cmp(&(b.watermark.clone(), b.set_id.clone())));
        Ok(found.into_iter().map(|s| s.set_id.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn set(id: &str, category: &str, watermark: &str) -> Set {
        Set {
            set_id: SetId(id.to_string()),
            category_id: CategoryId(category.to_string()),
            refs: Vec::new(),
            created_at: Utc.with_ymd_and_hms(2026, 7, 28, 0, 0, 0).unwrap(),
            watermark: ItemId(watermark.to_string()),
        }
    }

    #[tokio::test]
    async fn watermark_tracks_the_highest_seen_value_per_category() {
        let catalog = InMemorySetCatalog::new();
        catalog.put(set("S1", "c1", "i05")).await.unwrap();
        catalog.put(set("S2", "c1", "i10")).await.unwrap();
        assert_eq!(
            catalog.get_latest_watermark(&CategoryId("c1".into())).await.unwrap(),
            Some(ItemId("i10".into()))
        );
    }

    #[tokio::test]
    async fn unbuilt_category_has_no_watermark() {
        let catalog = InMemorySetCatalog::new();
        assert_eq!(
            catalog.get_latest_watermark(&CategoryId("never".into())).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn get_batch_omits_unknown_ids_without_failing() {
        let catalog = InMemorySetCatalog::new();
        catalog.put(set("S1", "c1", "i05")).await.unwrap();
        let found = catalog
            .get_batch(&[SetId("S1".into()), SetId("SNOPE".into())])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].set_id, SetId("S1".into()));
    }
}
