//! Redis-backed ranked feeds.
//!
//! Layout per owner (the `{owner}` hash tag keeps both keys in one cluster slot):
//! - `feed:{owner}` sorted set, member = content id, score = rank score
//! - `feed:{owner}:authors` hash, content id -> author id
//!
//! Every mutation that touches both keys runs as a single Lua script, so
//! concurrent writers for the same owner never observe a half-applied update.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use redis::{RedisError, Script};
use tracing::{debug, warn};
use uuid::Uuid;

use super::RankedFeedStore;
use crate::error::{AppError, Result};
use crate::models::FeedEntry;

/// KEYS: feed, authors. ARGV: max size, then (score, content id, author id) triples.
const UPSERT_AND_TRIM: &str = r#"
local max = tonumber(ARGV[1])
for i = 2, #ARGV, 3 do
  local score = tonumber(ARGV[i])
  local member = ARGV[i + 1]
  local current = redis.call('ZSCORE', KEYS[1], member)
  if (not current) or tonumber(current) < score then
    redis.call('ZADD', KEYS[1], score, member)
  end
  redis.call('HSET', KEYS[2], member, ARGV[i + 2])
end
local size = redis.call('ZCARD', KEYS[1])
if size > max then
  local evicted = redis.call('ZRANGE', KEYS[1], 0, size - max - 1)
  redis.call('ZREMRANGEBYRANK', KEYS[1], 0, size - max - 1)
  for _, member in ipairs(evicted) do
    redis.call('HDEL', KEYS[2], member)
  end
end
return redis.call('ZCARD', KEYS[1])
"#;

/// KEYS: feed, authors. ARGV: start, stop. Returns flat (member, score, author) triples.
const PAGE: &str = r#"
local rows = redis.call('ZREVRANGE', KEYS[1], ARGV[1], ARGV[2], 'WITHSCORES')
local out = {}
for i = 1, #rows, 2 do
  local author = redis.call('HGET', KEYS[2], rows[i])
  if not author then
    author = ''
  end
  table.insert(out, rows[i])
  table.insert(out, rows[i + 1])
  table.insert(out, author)
end
return out
"#;

/// KEYS: feed, authors. ARGV: author id.
const REMOVE_BY_AUTHOR: &str = r#"
local mapping = redis.call('HGETALL', KEYS[2])
local removed = 0
for i = 1, #mapping, 2 do
  if mapping[i + 1] == ARGV[1] then
    redis.call('ZREM', KEYS[1], mapping[i])
    redis.call('HDEL', KEYS[2], mapping[i])
    removed = removed + 1
  end
end
return removed
"#;

static UPSERT_AND_TRIM_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(UPSERT_AND_TRIM));
static PAGE_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(PAGE));
static REMOVE_BY_AUTHOR_SCRIPT: Lazy<Script> = Lazy::new(|| Script::new(REMOVE_BY_AUTHOR));

pub fn feed_key(owner: Uuid) -> String {
    format!("feed:{{{}}}", owner)
}

pub fn authors_key(owner: Uuid) -> String {
    format!("feed:{{{}}}:authors", owner)
}

#[derive(Clone)]
pub struct RedisFeedStore {
    conn: ConnectionManager,
    max_feed_size: usize,
}

impl RedisFeedStore {
    pub fn new(conn: ConnectionManager, max_feed_size: usize) -> Self {
        Self {
            conn,
            max_feed_size,
        }
    }

    pub async fn connect(redis_url: &str, max_feed_size: usize) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;
        let manager = ConnectionManager::new(client).await.map_err(|e| {
            AppError::StoreUnavailable(format!("Failed to create Redis connection: {}", e))
        })?;
        Ok(Self::new(manager, max_feed_size))
    }

    pub fn connection_manager(&self) -> ConnectionManager {
        self.conn.clone()
    }

    pub async fn ping(&self) -> Result<()> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.conn.clone())
            .await
            .map_err(|e| store_error("PING", Uuid::nil(), e))?;
        Ok(())
    }

    async fn upsert(&self, owner: Uuid, entries: &[FeedEntry]) -> Result<usize> {
        let mut invocation = UPSERT_AND_TRIM_SCRIPT.prepare_invoke();
        invocation
            .key(feed_key(owner))
            .key(authors_key(owner))
            .arg(self.max_feed_size);
        for entry in entries {
            invocation
                .arg(entry.score)
                .arg(entry.content_id.to_string())
                .arg(entry.author_id.to_string());
        }

        let size: usize = invocation
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error("insert", owner, e))?;
        Ok(size)
    }
}

fn store_error(op: &str, owner: Uuid, err: RedisError) -> AppError {
    warn!(owner = %owner, operation = op, error = %err, "Redis feed store operation failed");
    AppError::StoreUnavailable(format!("{} failed: {}", op, err))
}

fn parse_page(raw: Vec<String>) -> Vec<FeedEntry> {
    raw.chunks(3)
        .filter_map(|row| {
            let [member, score, author] = row else {
                return None;
            };
            let content_id = match Uuid::parse_str(member) {
                Ok(id) => id,
                Err(_) => {
                    warn!(member = %member, "Skipping non-uuid feed member");
                    return None;
                }
            };
            let score = score.parse::<f64>().ok()?;
            let author_id = Uuid::parse_str(author).unwrap_or_else(|_| {
                debug!(content_id = %content_id, "Feed entry without author mapping");
                Uuid::nil()
            });
            Some(FeedEntry::new(content_id, author_id, score))
        })
        .collect()
}

#[async_trait]
impl RankedFeedStore for RedisFeedStore {
    async fn insert_batch(&self, owner: Uuid, entries: &[FeedEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let size = self.upsert(owner, entries).await?;
        debug!(owner = %owner, inserted = entries.len(), size, "Inserted feed entries");
        Ok(())
    }

    async fn replace(&self, owner: Uuid, entries: &[FeedEntry]) -> Result<()> {
        // DEL and the refill run in one MULTI so readers see either the old
        // collection or the new one.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(feed_key(owner))
            .arg(authors_key(owner))
            .ignore();
        if !entries.is_empty() {
            // EVAL inside MULTI cannot fall back from EVALSHA, so send the body.
            pipe.cmd("EVAL")
                .arg(UPSERT_AND_TRIM)
                .arg(2)
                .arg(feed_key(owner))
                .arg(authors_key(owner))
                .arg(self.max_feed_size);
            for entry in entries {
                pipe.arg(entry.score)
                    .arg(entry.content_id.to_string())
                    .arg(entry.author_id.to_string());
            }
            pipe.ignore();
        }

        pipe.query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| store_error("replace", owner, e))?;
        debug!(owner = %owner, entries = entries.len(), "Replaced feed");
        Ok(())
    }

    async fn page(&self, owner: Uuid, start: usize, count: usize) -> Result<Vec<FeedEntry>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let stop = start + count - 1;
        let raw: Vec<String> = PAGE_SCRIPT
            .key(feed_key(owner))
            .key(authors_key(owner))
            .arg(start)
            .arg(stop)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error("page", owner, e))?;
        Ok(parse_page(raw))
    }

    async fn len(&self, owner: Uuid) -> Result<usize> {
        let len: usize = redis::cmd("ZCARD")
            .arg(feed_key(owner))
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error("len", owner, e))?;
        Ok(len)
    }

    async fn clear(&self, owner: Uuid) -> Result<()> {
        redis::cmd("DEL")
            .arg(feed_key(owner))
            .arg(authors_key(owner))
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| store_error("clear", owner, e))?;
        Ok(())
    }

    async fn remove_by_content(&self, owner: Uuid, content_id: Uuid) -> Result<bool> {
        let member = content_id.to_string();
        let (removed, _): (usize, usize) = redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(feed_key(owner))
            .arg(&member)
            .cmd("HDEL")
            .arg(authors_key(owner))
            .arg(&member)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error("remove_by_content", owner, e))?;
        Ok(removed > 0)
    }

    async fn remove_by_author(&self, owner: Uuid, author_id: Uuid) -> Result<usize> {
        let removed: usize = REMOVE_BY_AUTHOR_SCRIPT
            .key(feed_key(owner))
            .key(authors_key(owner))
            .arg(author_id.to_string())
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| store_error("remove_by_author", owner, e))?;
        Ok(removed)
    }
}
