//! Scenario tests for the Set Builder's partitioning algorithm, mirroring
//! the literal worked examples.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use qs_builder::Builder;
use qs_catalog::memory::InMemorySetCatalog;
use qs_catalog::SetCatalog;
use qs_pool::memory::InMemoryPoolStore;
use qs_pool::PoolStore;
use qs_store::memory::InMemoryContentStore;
use qs_store::ContentStore;
use qs_testkit::item;
use qs_types::{CategoryId, ItemId, SetId};

fn sequential_ids() -> impl Fn() -> SetId + Send + Sync + 'static {
    let counter = AtomicUsize::new(0);
    move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        SetId(format!("set-{n}"))
    }
}

#[tokio::test]
async fn scenario_6_builder_partitioning() {
    let store = Arc::new(InMemoryContentStore::new());
    let catalog = Arc::new(InMemorySetCatalog::new());
    let pool = Arc::new(InMemoryPoolStore::new());
    let builder = Builder::with_id_generator(store.clone(), catalog.clone(), pool.clone(), sequential_ids());

    let cat = CategoryId("cat-X".into());
    let ids: Vec<String> = (1..=14).map(|i| format!("i{i:02}")).collect();
    store
        .put_batch(ids.iter().map(|id| item(id, "cat-X")).collect())
        .await
        .unwrap();

    let report = builder.build(&[cat.clone()], 3, 5).await;
    assert_eq!(report.total_produced(), 2);

    let outcome = &report.categories[0];
    assert_eq!(outcome.category, cat);
    assert_eq!(outcome.produced, 2);
    assert!(!outcome.shortfall);
    assert_eq!(outcome.watermark, Some(ItemId("i10".into())));

    let pooled = pool.peek_all(&cat).await.unwrap();
    assert_eq!(pooled.len(), 2);

    let set_a = catalog.get(&pooled[0]).await.unwrap().unwrap();
    let set_b = catalog.get(&pooled[1]).await.unwrap().unwrap();
    assert_eq!(set_a.refs.len(), 5);
    assert_eq!(set_b.refs.len(), 5);
    assert_eq!(set_a.watermark, ItemId("i10".into()));
    assert_eq!(set_b.watermark, ItemId("i10".into()));

    let consumed_ids: Vec<String> = set_a
        .refs
        .iter()
        .chain(set_b.refs.iter())
        .map(|r| r.id.0.clone())
        .collect();
    assert_eq!(
        consumed_ids,
        (1..=10).map(|i| format!("i{i:02}")).collect::<Vec<_>>()
    );

    // Next run sees the remaining i11..i14 past the new watermark but not
    // enough for another full set of 5 — a logged shortfall, not an error.
    let second_report = builder.build(&[cat.clone()], 3, 5).await;
    assert_eq!(second_report.categories[0].produced, 0);
    assert!(second_report.categories[0].shortfall);
}

#[tokio::test]
async fn zero_eligible_items_is_a_shortfall_not_a_failure() {
    let store = Arc::new(InMemoryContentStore::new());
    let catalog = Arc::new(InMemorySetCatalog::new());
    let pool = Arc::new(InMemoryPoolStore::new());
    let builder = Builder::with_id_generator(store, catalog, pool, sequential_ids());

    let cat = CategoryId("never-ingested".into());
    let report = builder.build(&[cat.clone()], 3, 5).await;
    assert_eq!(report.total_produced(), 0);
    assert!(report.categories[0].shortfall);
    assert_eq!(report.categories[0].watermark, None);
}

#[tokio::test]
async fn crashed_enqueue_is_recovered_on_the_next_run() {
    let store = Arc::new(InMemoryContentStore::new());
    let catalog = Arc::new(InMemorySetCatalog::new());
    let pool = Arc::new(InMemoryPoolStore::new());
    let builder = Builder::with_id_generator(store.clone(), catalog.clone(), pool.clone(), sequential_ids());

    let cat = CategoryId("cat-X".into());
    store
        .put_batch((1..=5).map(|i| item(&format!("i{i:02}"), "cat-X")).collect())
        .await
        .unwrap();

    // Simulate a catalog write that succeeded but whose pool enqueue never
    // happened (e.g. the process crashed in between): the set exists in the
    // catalog, the watermark has moved past its items, but the pool is empty.
    let orphan = qs_testkit::set("orphan-0", "cat-X", "i05", qs_testkit::fixed_now(), 0);
    catalog.put(orphan).await.unwrap();
    assert!(pool.peek_all(&cat).await.unwrap().is_empty());

    // A subsequent run finds no new items past the watermark (shortfall),
    // but must still re-enqueue the orphaned catalog set.
    let report = builder.build(&[cat.clone()], 3, 5).await;
    assert_eq!(report.categories[0].produced, 0);
    assert!(report.categories[0].shortfall);

    let pooled = pool.peek_all(&cat).await.unwrap();
    assert_eq!(pooled, vec![SetId("orphan-0".into())]);
}

#[tokio::test]
async fn re_enqueue_is_safe_when_a_set_already_made_it_into_the_pool() {
    let store = Arc::new(InMemoryContentStore::new());
    let catalog = Arc::new(InMemorySetCatalog::new());
    let pool = Arc::new(InMemoryPoolStore::new());
    let builder = Builder::with_id_generator(store.clone(), catalog.clone(), pool.clone(), sequential_ids());

    let cat = CategoryId("cat-X".into());
    store
        .put_batch((1..=5).map(|i| item(&format!("i{i:02}"), "cat-X")).collect())
        .await
        .unwrap();
    builder.build(&[cat.clone()], 1, 5).await;

    let before = pool.peek_all(&cat).await.unwrap();
    assert_eq!(before.len(), 1);

    // Simulate a second pass over the same category after a crash between
    // catalog write and pool enqueue: nothing new to build (watermark
    // already covers i01..i05), so the pool must be unchanged, not doubled.
    builder.build(&[cat.clone()], 1, 5).await;
    let after = pool.peek_all(&cat).await.unwrap();
    assert_eq!(after, before);
}
