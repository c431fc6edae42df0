// Licensed under the Apache License, Version 2.0. See LICENSE for details.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use qs_allocator::{Allocator, AllocatorConfig};
use qs_builder::Builder;
use qs_catalog::memory::InMemorySetCatalog;
use qs_ledger::memory::InMemoryLedgerStore;
use qs_pool::memory::InMemoryPoolStore;
use qs_server::config::CategoryTable;
use qs_server::{app, AppState, ContentStoreMaterializer};
use qs_store::memory::InMemoryContentStore;

/// Reference HTTP realization of the allocation engine's operations
/// surface. Not the core; a thin shell wiring `qs-allocator`,
/// `qs-builder`, and the in-memory stores behind three routes.
#[derive(Parser, Debug)]
struct Args {
    /// TCP port to listen on.
    #[arg(long, env = "QS_SERVER_PORT", default_value_t = 8080)]
    port: u16,
    /// Path to the category table TOML file.
    #[arg(long, env = "QS_CATEGORY_TABLE")]
    category_table: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let categories = CategoryTable::load(&args.category_table)?;

    let ledger = Arc::new(InMemoryLedgerStore::new());
    let pool = Arc::new(InMemoryPoolStore::new());
    let catalog = Arc::new(InMemorySetCatalog::new());
    let store = Arc::new(InMemoryContentStore::new());

    let allocator = Arc::new(Allocator::new(ledger.clone(), pool.clone(), AllocatorConfig::default()));
    let builder = Arc::new(Builder::new(store.clone(), catalog.clone(), pool.clone()));
    let materializer = Arc::new(ContentStoreMaterializer::new(store));

    let state = Arc::new(AppState {
        known_categories: categories.ids(),
        allocator,
        builder,
        catalog,
        ledger,
        materializer,
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!(port = args.port, "qs-server listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}
