//! Redis-backed [`LedgerStore`], using the keys documented in the
//! operations surface:
//!
//! - `alloc:<userId>` — hash of `categoryId -> JSON-encoded ordered set-id list`
//! - `alloc:meta:<userId>` — hash of scalar counters and timestamps
//! - `alloc:ts:<userId>` — hash of `<categoryId>:<setId> -> ISO-8601 timestamp`
//!
//! Every multi-key mutation (append, apply_eviction, reset_user) is a
//! single Lua script so the list, its timestamps, and its counters move
//! together — the same "use scripts when the backing store supports them"
//! guidance the pool index follows.

use chrono::{DateTime, SecondsFormat, Utc};
use qs_eviction::EvictionOutcome;
use qs_types::{CategoryId, LedgerEntry, SetId, UserId};
use redis::{AsyncCommands, Script};

use crate::{CategoryMetadata, LedgerError, LedgerStore, UserMetadata};

fn map_err(e: redis::RedisError) -> LedgerError {
    if e.is_timeout() {
        LedgerError::Timeout
    } else {
        LedgerError::Unavailable(e.to_string())
    }
}

fn ts_field(category: &CategoryId, set_id: &SetId) -> String {
    format!("{category}:{set_id}")
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
}

/// A Redis-backed ledger store sharing one multiplexed connection across
/// all callers (safe because Redis pipelines/multiplexes commands
/// internally; per-(user,category) serialization still happens above this
/// layer, in `qs-allocator`).
pub struct RedisLedgerStore {
    client: redis::Client,
}

impl RedisLedgerStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379`).
    pub fn new(url: &str) -> Result<Self, LedgerError> {
        let client = redis::Client::open(url).map_err(map_err)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection, LedgerError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(map_err)
    }
}

const APPEND_SCRIPT: &str = r#"
local list_key = KEYS[1]
local ts_key = KEYS[2]
local meta_key = KEYS[3]
local category = ARGV[1]
local set_id = ARGV[2]
local ts = ARGV[3]
local ts_field = ARGV[4]

local raw = redis.call('HGET', list_key, category)
local ids = {}
if raw then
  ids = cjson.decode(raw)
  for _, existing in ipairs(ids) do
    if existing == set_id then
      return redis.error_reply('duplicate set id ' .. set_id)
    end
  end
end
table.insert(ids, set_id)
redis.call('HSET', list_key, category, cjson.encode(ids))
redis.call('HSET', ts_key, ts_field, ts)
redis.call('HSET', meta_key, category .. ':count', #ids)
redis.call('HSET', meta_key, category .. ':last_assigned', ts)
redis.call('HSET', meta_key, category .. ':last_updated', ts)
redis.call('HSET', meta_key, 'last_updated', ts)
return #ids
"#;

const APPLY_EVICTION_SCRIPT: &str = r#"
local list_key = KEYS[1]
local ts_key = KEYS[2]
local meta_key = KEYS[3]
local category = ARGV[1]
local now = ARGV[2]
local removed_count = tonumber(ARGV[3])

local raw = redis.call('HGET', list_key, category)
if not raw then
  return cjson.encode({})
end
local ids = cjson.decode(raw)
local removed = {}
for i = 1, removed_count do
  removed[ARGV[3 + i]] = true
end
local survivors = {}
for _, id in ipairs(ids) do
  if removed[id] then
    redis.call('HDEL', ts_key, category .. ':' .. id)
  else
    table.insert(survivors, id)
  end
end

if #survivors == 0 then
  redis.call('HDEL', list_key, category)
  redis.call('HDEL', meta_key, category .. ':count', category .. ':last_assigned', category .. ':last_updated')
else
  redis.call('HSET', list_key, category, cjson.encode(survivors))
  redis.call('HSET', meta_key, category .. ':count', #survivors)
  redis.call('HSET', meta_key, category .. ':last_updated', now)
end

local prior_evicted = tonumber(redis.call('HGET', meta_key, category .. ':evicted_count')) or 0
redis.call('HSET', meta_key, category .. ':evicted_count', prior_evicted + removed_count)
redis.call('HSET', meta_key, category .. ':evicted_at', now)
redis.call('HSET', meta_key, 'last_updated', now)

return cjson.encode(survivors)
"#;

#[async_trait::async_trait]
impl LedgerStore for RedisLedgerStore {
    async fn read(&self, user: &UserId, category: &CategoryId) -> Result<Vec<LedgerEntry>, LedgerError> {
        let mut conn = self.conn().await?;
        let list_key = format!("alloc:{user}");
        let ts_key = format!("alloc:ts:{user}");

        let raw: Option<String> = conn.hget(&list_key, category.to_string()).await.map_err(map_err)?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = serde_json::from_str(&raw)
            .map_err(|e| LedgerError::InvariantViolation(format!("corrupt ledger list: {e}")))?;

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            let field = format!("{category}:{id}");
            let ts_raw: Option<String> = conn.hget(&ts_key, &field).await.map_err(map_err)?;
            entries.push(LedgerEntry {
                set_id: SetId(id),
                assigned_at: ts_raw.as_deref().and_then(parse_ts),
            });
        }
        Ok(entries)
    }

    async fn categories_for_user(&self, user: &UserId) -> Result<Vec<CategoryId>, LedgerError> {
        let mut conn = self.conn().await?;
        let list_key = format!("alloc:{user}");
        let categories: Vec<String> = conn.hkeys(&list_key).await.map_err(map_err)?;
        Ok(categories.into_iter().map(CategoryId).collect())
    }

    async fn apply_eviction(
        &self,
        user: &UserId,
        category: &CategoryId,
        outcome: &EvictionOutcome,
        now: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>, LedgerError> {
        if outcome.is_empty() {
            return self.read(user, category).await;
        }
        let mut conn = self.conn().await?;
        let list_key = format!("alloc:{user}");
        let ts_key = format!("alloc:ts:{user}");
        let meta_key = format!("alloc:meta:{user}");

        let mut invocation = Script::new(APPLY_EVICTION_SCRIPT).key(&list_key).key(&ts_key).key(&meta_key);
        invocation = invocation
            .arg(category.to_string())
            .arg(format_ts(now))
            .arg(outcome.removed_count());
        for (set_id, _reason) in &outcome.removed {
            invocation = invocation.arg(set_id.to_string());
        }
        let survivors_raw: String = invocation.invoke_async(&mut conn).await.map_err(map_err)?;
        let survivor_ids: Vec<String> = serde_json::from_str(&survivors_raw)
            .map_err(|e| LedgerError::InvariantViolation(format!("corrupt script result: {e}")))?;

        let ts_key_clone = ts_key.clone();
        let mut entries = Vec::with_capacity(survivor_ids.len());
        for id in survivor_ids {
            let field = format!("{category}:{id}");
            let ts_raw: Option<String> = conn.hget(&ts_key_clone, &field).await.map_err(map_err)?;
            entries.push(LedgerEntry {
                set_id: SetId(id),
                assigned_at: ts_raw.as_deref().and_then(parse_ts),
            });
        }
        Ok(entries)
    }

    async fn append(
        &self,
        user: &UserId,
        category: &CategoryId,
        set_id: SetId,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let mut conn = self.conn().await?;
        let list_key = format!("alloc:{user}");
        let ts_key = format!("alloc:ts:{user}");
        let meta_key = format!("alloc:meta:{user}");

        let result: redis::RedisResult<i64> = Script::new(APPEND_SCRIPT)
            .key(&list_key)
            .key(&ts_key)
            .key(&meta_key)
            .arg(category.to_string())
            .arg(set_id.to_string())
            .arg(format_ts(now))
            .arg(ts_field(category, &set_id))
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.to_string().contains("duplicate set id") => Err(LedgerError::InvariantViolation(format!(
                "set {set_id} already present in ledger for user {user} category {category}"
            ))),
            Err(e) => Err(map_err(e)),
        }
    }

    async fn metadata(&self, user: &UserId) -> Result<UserMetadata, LedgerError> {
        let mut conn = self.conn().await?;
        let list_key = format!("alloc:{user}");
        let meta_key = format!("alloc:meta:{user}");

        let categories: Vec<String> = conn.hkeys(&list_key).await.map_err(map_err)?;
        let raw_meta: std::collections::HashMap<String, String> =
            conn.hgetall(&meta_key).await.map_err(map_err)?;

        let mut out = UserMetadata {
            last_updated: raw_meta.get("last_updated").and_then(|v| parse_ts(v)),
            categories: Default::default(),
        };
        for category in categories {
            let get = |suffix: &str| raw_meta.get(&format!("{category}:{suffix}")).cloned();
            let count = get("count").and_then(|v| v.parse().ok()).unwrap_or(0);
            out.categories.insert(
                CategoryId(category),
                CategoryMetadata {
                    count,
                    last_assigned: get("last_assigned").and_then(|v| parse_ts(&v)),
                    last_updated: get("last_updated").and_then(|v| parse_ts(&v)),
                    evicted_count: get("evicted_count").and_then(|v| v.parse().ok()).unwrap_or(0),
                    evicted_at: get("evicted_at").and_then(|v| parse_ts(&v)),
                },
            );
        }
        Ok(out)
    }

    async fn reset_user(&self, user: &UserId) -> Result<(), LedgerError> {
        let mut conn = self.conn().await?;
        let keys = [
            format!("alloc:{user}"),
            format!("alloc:meta:{user}"),
            format!("alloc:ts:{user}"),
        ];
        let _: () = conn.del(&keys).await.map_err(map_err)?;
        Ok(())
    }
}
