// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! A thin `axum` reference realization of the operations surface. The
//! real HTTP surface is explicitly out of scope for the core; this
//! exists only so §6's wire contract has one working implementation to
//! test against, the way the teacher's `environmentd` is a thin shell
//! around `mz-adapter`/`mz-catalog`.

pub mod config;
pub mod routes;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use axum::routing::post;
use axum::Router;
use qs_allocator::Allocator;
use qs_builder::Builder;
use qs_catalog::SetCatalog;
use qs_ledger::LedgerStore;
use qs_store::ContentStore;
use qs_types::{CategoryId, Set};

/// Materializes a built [`Set`] into its full item payloads for the
/// `merge` surface. The core does not implement this — merge is
/// surface-only — so `qs-server` takes it as an injected dependency.
#[async_trait]
pub trait MergeMaterializer: Send + Sync {
    /// Resolves every item referenced by `set` to its stored payload.
    async fn materialize(&self, set: &Set) -> Vec<serde_json::Value>;
}

/// The default materializer: looks items up directly in the Content
/// Store and returns their raw payloads, silently dropping any ref whose
/// item has since disappeared (append-only stores should not produce
/// this, but a defensive reference implementation does not assume it).
pub struct ContentStoreMaterializer {
    store: Arc<dyn ContentStore>,
}

impl ContentStoreMaterializer {
    /// Wraps a content store as a materializer.
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MergeMaterializer for ContentStoreMaterializer {
    async fn materialize(&self, set: &Set) -> Vec<serde_json::Value> {
        let keys: Vec<qs_store::ItemKey> = set
            .refs
            .iter()
            .map(|r| qs_store::ItemKey {
                id: r.id.clone(),
                hash: r.hash.clone(),
            })
            .collect();
        match self.store.get_batch(&keys).await {
            Ok(items) => items.into_iter().map(|item| item.payload).collect(),
            Err(e) => {
                tracing::warn!(set_id = %set.set_id, error = %e, "merge materialization failed to read content store");
                Vec::new()
            }
        }
    }
}

/// Shared application state wired into every route handler.
pub struct AppState {
    /// Known category ids, loaded from the config artifact at startup.
    pub known_categories: BTreeSet<CategoryId>,
    /// The allocator, composing ledger + pool + eviction.
    pub allocator: Arc<Allocator>,
    /// The builder, composing store + catalog + pool.
    pub builder: Arc<Builder>,
    /// The set catalog, used directly by the merge route.
    pub catalog: Arc<dyn SetCatalog>,
    /// The ledger, read directly (never written) by the merge route to
    /// find a user's most recently assigned set per category.
    pub ledger: Arc<dyn LedgerStore>,
    /// The merge materializer.
    pub materializer: Arc<dyn MergeMaterializer>,
}

/// Builds the three-route operations surface over `state`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/generate-sets", post(routes::generate_sets))
        .route("/allocate", post(routes::allocate))
        .route("/merge", post(routes::merge))
        .with_state(state)
}
