//! `sqlx`-backed [`SetCatalog`]. Schema:
//!
//! ```sql
//! CREATE TABLE sets (
//!     set_id      TEXT PRIMARY KEY,
//!     category_id TEXT NOT NULL,
//!     refs        JSONB NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     watermark   TEXT NOT NULL
//! );
//! CREATE INDEX sets_category_watermark_idx ON sets (category_id, watermark DESC);
//! ```

use qs_types::{CategoryId, ItemId, ItemRef, Set, SetId};
use sqlx::{PgPool, Row};

use crate::{CatalogError, SetCatalog};

fn map_err(e: sqlx::Error) -> CatalogError {
    CatalogError::Unavailable(e.to_string())
}

/// A Postgres-backed set catalog.
pub struct PostgresSetCatalog {
    pool: PgPool,
}

impl PostgresSetCatalog {
    /// Wraps an already-configured connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn row_to_set(row: sqlx::postgres::PgRow) -> Result<Set, CatalogError> {
    let refs_json: serde_json::Value = row.try_get("refs").map_err(map_err)?;
    let refs: Vec<ItemRef> = serde_json::from_value(refs_json)
        .map_err(|e| CatalogError::Unavailable(format!("corrupt refs column: {e}")))?;
    Ok(Set {
        set_id: SetId(row.try_get::<String, _>("set_id").map_err(map_err)?),
        category_id: CategoryId(row.try_get::<String, _>("category_id").map_err(map_err)?),
        refs,
        created_at: row.try_get("created_at").map_err(map_err)?,
        watermark: ItemId(row.try_get::<String, _>("watermark").map_err(map_err)?),
    })
}

#[async_trait::async_trait]
impl SetCatalog for PostgresSetCatalog {
    async fn put(&self, set: Set) -> Result<(), CatalogError> {
        let refs_json = serde_json::to_value(&set.refs)
            .map_err(|e| CatalogError::Unavailable(format!("failed to encode refs: {e}")))?;
        sqlx::query(
            "INSERT INTO sets (set_id, category_id, refs, created_at, watermark) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(set.set_id.0)
        .bind(set.category_id.0)
        .bind(refs_json)
        .bind(set.created_at)
        .bind(set.watermark.0)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn get_latest_watermark(&self, category: &CategoryId) -> Result<Option<ItemId>, CatalogError> {
        let row = sqlx::query(
            "SELECT watermark FROM sets WHERE category_id = $1 ORDER BY watermark DESC LIMIT 1",
        )
        .bind(&category.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(row
            .map(|r| r.try_get::<String, _>("watermark").map_err(map_err))
            .transpose()?
            .map(ItemId))
    }

    async fn get(&self, set_id: &SetId) -> Result<Option<Set>, CatalogError> {
        let row = sqlx::query("SELECT set_id, category_id, refs, created_at, watermark FROM sets WHERE set_id = $1")
            .bind(&set_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;
        row.map(row_to_set).transpose()
    }

    async fn get_batch(&self, set_ids: &[SetId]) -> Result<Vec<Set>, CatalogError> {
        let ids: Vec<&str> = set_ids.iter().map(|id| id.0.as_str()).collect();
        let rows = sqlx::query(
            "SELECT set_id, category_id, refs, created_at, watermark FROM sets WHERE set_id = ANY($1)",
        )
        .bind(&ids as &[&str])
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        rows.into_iter().map(row_to_set).collect()
    }

    async fn list_set_ids(&self, category: &CategoryId) -> Result<Vec<SetId>, CatalogError> {
        let rows = sqlx::query(
            "SELECT set_id FROM sets WHERE category_id = $1 ORDER BY watermark ASC, set_id ASC",
        )
        .bind(&category.0)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;
        rows.into_iter()
            .map(|r| r.try_get::<String, _>("set_id").map(SetId).map_err(map_err))
            .collect()
    }
}
