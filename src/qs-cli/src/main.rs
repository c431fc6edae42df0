// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! Administrative CLI. Exit codes: `0` success, `1` validation error,
//! `2` backend unavailable — exactly the operations surface's contract.

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use qs_builder::Builder;
use qs_catalog::postgres::PostgresSetCatalog;
use qs_catalog::SetCatalog;
use qs_ledger::{LedgerStore, RedisLedgerStore};
use qs_pool::{PoolStore, RedisPoolStore};
use qs_store::postgres::PostgresContentStore;
use qs_store::ContentStore;
use qs_types::{CategoryId, UserId};

mod commands;

/// Administrative operations for the allocation engine.
#[derive(Parser, Debug)]
struct Cli {
    /// Redis URL for the ledger and pool stores. If unset, an ephemeral
    /// in-memory store is used instead — useful for `list-config` and
    /// dry-run build checks, meaningless for `drain`/`reset-user` against
    /// a real deployment.
    #[arg(long, env = "QS_REDIS_URL")]
    redis_url: Option<String>,

    /// Postgres connection string for the content store and set catalog.
    /// Only consulted by `build`.
    #[arg(long, env = "QS_DATABASE_URL")]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pops every set-id off a category's pool, printing each as it's drained.
    Drain {
        /// Category to drain.
        category_id: String,
    },
    /// Clears a user's entire ledger across every category.
    ResetUser {
        /// User to reset.
        user_id: String,
    },
    /// Runs the eviction policy against a single user across every
    /// category they have allocations in.
    EvictUser {
        /// User to evict.
        user_id: String,
    },
    /// Lists every runtime-mutable configuration knob and its current value.
    ListConfig,
    /// Sets a runtime-mutable configuration knob.
    SetConfig {
        /// Config key, e.g. `max_sets_per_category`.
        key: String,
        /// New value.
        value: u32,
    },
    /// Manually triggers a build run over the given categories, bypassing
    /// the async `generate-sets` route — useful for backfills and
    /// one-off reseeding. Requires `--database-url`; the content store
    /// and set catalog have no meaningful in-memory substitute here since
    /// the whole point is to read durably-ingested items.
    Build {
        /// Categories to build, e.g. `cat-algebra`.
        #[arg(long = "category", required = true)]
        categories: Vec<String>,
        /// Maximum sets to produce per category.
        #[arg(long)]
        num_sets_per_category: usize,
        /// Items per set.
        #[arg(long)]
        items_per_set: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::from(0),
        Err(commands::CliError::Validation(msg)) => {
            eprintln!("validation error: {msg}");
            ExitCode::from(1)
        }
        Err(commands::CliError::Backend(msg)) => {
            eprintln!("backend unavailable: {msg}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> Result<(), commands::CliError> {
    let now = Utc::now();
    let (ledger, pool): (Arc<dyn LedgerStore>, Arc<dyn PoolStore>) = match &cli.redis_url {
        Some(url) => (
            Arc::new(RedisLedgerStore::new(url).map_err(|e| commands::CliError::Backend(e.to_string()))?),
            Arc::new(RedisPoolStore::new(url).map_err(|e| commands::CliError::Backend(e.to_string()))?),
        ),
        None => (
            Arc::new(qs_ledger::memory::InMemoryLedgerStore::new()),
            Arc::new(qs_pool::memory::InMemoryPoolStore::new()),
        ),
    };

    match cli.command {
        Command::Drain { category_id } => {
            commands::drain(pool.as_ref(), &CategoryId(category_id), now).await
        }
        Command::ResetUser { user_id } => {
            commands::reset_user(ledger.as_ref(), &UserId(user_id)).await
        }
        Command::EvictUser { user_id } => {
            commands::evict_user(ledger.as_ref(), &UserId(user_id), now).await
        }
        Command::ListConfig => commands::list_config(),
        Command::SetConfig { key, value } => commands::set_config(&key, value),
        Command::Build {
            categories,
            num_sets_per_category,
            items_per_set,
        } => {
            let url = cli
                .database_url
                .ok_or_else(|| commands::CliError::Validation("build requires --database-url".to_string()))?;
            let pg_pool = sqlx::PgPool::connect(&url)
                .await
                .map_err(|e| commands::CliError::Backend(e.to_string()))?;
            let store: Arc<dyn ContentStore> = Arc::new(PostgresContentStore::new(pg_pool.clone()));
            let catalog: Arc<dyn SetCatalog> = Arc::new(PostgresSetCatalog::new(pg_pool));
            let builder = Builder::new(store, catalog, pool);
            let category_ids: Vec<CategoryId> = categories.into_iter().map(CategoryId).collect();
            let report = builder.build(&category_ids, num_sets_per_category, items_per_set).await;
            for outcome in &report.categories {
                println!(
                    "{}: produced={} shortfall={} watermark={:?}",
                    outcome.category, outcome.produced, outcome.shortfall, outcome.watermark
                );
            }
            Ok(())
        }
    }
}
