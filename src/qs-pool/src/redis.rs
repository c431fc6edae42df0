//! Redis-backed [`PoolStore`], using the keys documented in the
//! operations surface:
//!
//! - `pool:queue:<categoryId>` — a Redis list, head is oldest
//! - `pool:meta:<categoryId>` — a hash of `available`/`last_updated`/`last_batch_size`
//!
//! `enqueue` is a single Lua script so the list push and the metadata
//! update are one atomic step, as the operations surface requires.

use chrono::{DateTime, SecondsFormat, Utc};
use qs_types::{CategoryId, SetId};
use redis::{AsyncCommands, Script};

use crate::{PoolError, PoolMetadata, PoolStore};

fn map_err(e: redis::RedisError) -> PoolError {
    if e.is_timeout() {
        PoolError::Timeout
    } else {
        PoolError::Unavailable(e.to_string())
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
}

/// A Redis-backed pool store.
pub struct RedisPoolStore {
    client: redis::Client,
}

impl RedisPoolStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    pub fn new(url: &str) -> Result<Self, PoolError> {
        let client = redis::Client::open(url).map_err(map_err)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, PoolError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_err)
    }
}

const ENQUEUE_SCRIPT: &str = r#"
local queue_key = KEYS[1]
local meta_key = KEYS[2]
local ts = ARGV[1]
local batch_size = tonumber(ARGV[2])

for i = 3, #ARGV do
  redis.call('RPUSH', queue_key, ARGV[i])
end
redis.call('HSET', meta_key, 'available', redis.call('LLEN', queue_key))
redis.call('HSET', meta_key, 'last_updated', ts)
redis.call('HSET', meta_key, 'last_batch_size', batch_size)
return redis.call('LLEN', queue_key)
"#;

#[async_trait::async_trait]
impl PoolStore for RedisPoolStore {
    async fn enqueue(&self, category: &CategoryId, set_ids: Vec<SetId>, now: DateTime<Utc>) -> Result<(), PoolError> {
        if set_ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let queue_key = format!("pool:queue:{category}");
        let meta_key = format!("pool:meta:{category}");

        let mut invocation = Script::new(ENQUEUE_SCRIPT)
            .key(&queue_key)
            .key(&meta_key)
            .arg(format_ts(now))
            .arg(set_ids.len());
        for id in &set_ids {
            invocation = invocation.arg(id.to_string());
        }
        let _: i64 = invocation.invoke_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    async fn peek_all(&self, category: &CategoryId) -> Result<Vec<SetId>, PoolError> {
        let mut conn = self.conn().await?;
        let queue_key = format!("pool:queue:{category}");
        let ids: Vec<String> = conn.lrange(&queue_key, 0, -1).await.map_err(map_err)?;
        Ok(ids.into_iter().map(SetId).collect())
    }

    async fn dequeue_one(&self, category: &CategoryId, now: DateTime<Utc>) -> Result<Option<SetId>, PoolError> {
        let mut conn = self.conn().await?;
        let queue_key = format!("pool:queue:{category}");
        let meta_key = format!("pool:meta:{category}");

        let popped: Option<String> = conn.lpop(&queue_key, None).await.map_err(map_err)?;
        if popped.is_some() {
            let remaining: i64 = conn.llen(&queue_key).await.map_err(map_err)?;
            let _: () = conn.hset(&meta_key, "available", remaining).await.map_err(map_err)?;
            let _: () = conn.hset(&meta_key, "last_updated", format_ts(now)).await.map_err(map_err)?;
        }
        Ok(popped.map(SetId))
    }

    async fn drop_category(&self, category: &CategoryId, now: DateTime<Utc>) -> Result<(), PoolError> {
        let mut conn = self.conn().await?;
        let queue_key = format!("pool:queue:{category}");
        let meta_key = format!("pool:meta:{category}");
        let _: () = conn.del(&queue_key).await.map_err(map_err)?;
        let _: () = conn.hset(&meta_key, "available", 0).await.map_err(map_err)?;
        let _: () = conn.hset(&meta_key, "last_updated", format_ts(now)).await.map_err(map_err)?;
        Ok(())
    }

    async fn metadata(&self, category: &CategoryId) -> Result<PoolMetadata, PoolError> {
        let mut conn = self.conn().await?;
        let meta_key = format!("pool:meta:{category}");
        let raw: std::collections::HashMap<String, String> = conn.hgetall(&meta_key).await.map_err(map_err)?;
        Ok(PoolMetadata {
            available: raw.get("available").and_then(|v| v.parse().ok()).unwrap_or(0),
            last_updated: raw.get("last_updated").and_then(|v| parse_ts(v)),
            last_batch_size: raw.get("last_batch_size").and_then(|v| v.parse().ok()).unwrap_or(0),
        })
    }
}
