//! `sqlx`-backed [`ContentStore`], for durable single-writer-per-hash
//! deployments. Schema:
//!
//! ```sql
//! CREATE TABLE items (
//!     id          TEXT PRIMARY KEY,
//!     hash        TEXT NOT NULL,
//!     category_id TEXT NOT NULL,
//!     payload     JSONB NOT NULL
//! );
//! CREATE UNIQUE INDEX items_hash_idx ON items (hash);
//! CREATE INDEX items_category_id_idx ON items (category_id, id);
//! ```

use qs_types::{CategoryId, ContentHash, Item, ItemId};
use sqlx::{PgPool, Row};

use crate::{ContentStore, ItemKey, PutBatchOutcome, StoreError};

fn map_err(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

/// A Postgres-backed content store.
pub struct PostgresContentStore {
    pool: PgPool,
}

impl PostgresContentStore {
    /// Wraps an already-configured connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_item(row: sqlx::postgres::PgRow) -> Result<Item, StoreError> {
    let payload: serde_json::Value = row.try_get("payload").map_err(map_err)?;
    Ok(Item {
        id: ItemId(row.try_get::<String, _>("id").map_err(map_err)?),
        hash: ContentHash(row.try_get::<String, _>("hash").map_err(map_err)?),
        category_id: CategoryId(row.try_get::<String, _>("category_id").map_err(map_err)?),
        payload,
    })
}

#[async_trait::async_trait]
impl ContentStore for PostgresContentStore {
    async fn put_batch(&self, items: Vec<Item>) -> Result<PutBatchOutcome, StoreError> {
        let mut outcome = PutBatchOutcome::default();
        let mut tx = self.pool.begin().await.map_err(map_err)?;
        for item in items {
            let result = sqlx::query(
                "INSERT INTO items (id, hash, category_id, payload) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (hash) DO NOTHING",
            )
            .bind(item.id.0)
            .bind(item.hash.0)
            .bind(item.category_id.0)
            .bind(item.payload)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
            if result.rows_affected() == 1 {
                outcome.stored += 1;
            } else {
                outcome.skipped_duplicate_by_hash += 1;
            }
        }
        tx.commit().await.map_err(map_err)?;
        Ok(outcome)
    }

    async fn get_batch(&self, keys: &[ItemKey]) -> Result<Vec<Item>, StoreError> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let row = sqlx::query("SELECT id, hash, category_id, payload FROM items WHERE id = $1 AND hash = $2")
                .bind(&key.id.0)
                .bind(&key.hash.0)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_err)?;
            if let Some(row) = row {
                out.push(row_to_item(row)?);
            }
        }
        Ok(out)
    }

    async fn query_by_category(&self, category: &CategoryId, after_id: Option<&ItemId>) -> Result<Vec<Item>, StoreError> {
        let rows = match after_id {
            Some(after) => {
                sqlx::query(
                    "SELECT id, hash, category_id, payload FROM items \
                     WHERE category_id = $1 AND id > $2 ORDER BY id ASC",
                )
                .bind(&category.0)
                .bind(&after.0)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, hash, category_id, payload FROM items \
                     WHERE category_id = $1 ORDER BY id ASC",
                )
                .bind(&category.0)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(map_err)?;
        rows.into_iter().map(row_to_item).collect()
    }

    async fn query_by_hash(&self, hash: &ContentHash) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query("SELECT id, hash, category_id, payload FROM items WHERE hash = $1")
            .bind(&hash.0)
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        rows.into_iter().map(row_to_item).collect()
    }
}
