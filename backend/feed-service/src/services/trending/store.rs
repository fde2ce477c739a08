//! Append-only trend logs and cached trend snapshots.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::warn;

use crate::error::{AppError, Result};

/// One append-only, time-ordered log of trend subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrendLog {
    /// Every use of a hashtag; subject = normalized tag, occurrence = content id.
    HashtagUsage,
    /// Every like; subject = content id, occurrence = liking user.
    TweetLikes,
    /// Content tagged with one hashtag; subject = occurrence = content id.
    TaggedContent(String),
}

impl TrendLog {
    pub fn key(&self) -> String {
        match self {
            TrendLog::HashtagUsage => "trend:log:hashtags".to_string(),
            TrendLog::TweetLikes => "trend:log:likes".to_string(),
            TrendLog::TaggedContent(tag) => format!("trend:log:tag:{}", tag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendKind {
    Hashtags,
    Tweets,
}

impl TrendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendKind::Hashtags => "hashtags",
            TrendKind::Tweets => "tweets",
        }
    }

    pub fn snapshot_key(&self) -> String {
        format!("trend:snapshot:{}", self.as_str())
    }
}

#[async_trait]
pub trait TrendStore: Send + Sync {
    /// Record `subject` at `at`. Appending the same `(subject, occurrence)`
    /// again only moves its timestamp, so redelivered events count once.
    async fn append(
        &self,
        log: &TrendLog,
        subject: &str,
        occurrence: &str,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Subjects appended at or after `since`, oldest first.
    async fn window(&self, log: &TrendLog, since: DateTime<Utc>) -> Result<Vec<String>>;

    /// Raw serialized snapshot, if one is stored.
    async fn load_snapshot(&self, kind: TrendKind) -> Result<Option<String>>;

    async fn store_snapshot(&self, kind: TrendKind, raw: &str, ttl: Duration) -> Result<()>;

    async fn delete_snapshot(&self, kind: TrendKind) -> Result<()>;
}

/// Trend logs as Redis sorted sets scored by epoch millis. Members are
/// `subject|occurrence`, so a repeated ZADD of one occurrence overwrites it.
#[derive(Clone)]
pub struct RedisTrendStore {
    conn: ConnectionManager,
}

impl RedisTrendStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn redis_error(op: &str, key: &str, err: redis::RedisError) -> AppError {
    warn!(key = %key, operation = op, error = %err, "Redis trend store operation failed");
    AppError::StoreUnavailable(format!("{} {} failed: {}", op, key, err))
}

fn strip_occurrence_suffix(member: String) -> String {
    match member.rsplit_once('|') {
        Some((subject, _)) => subject.to_string(),
        None => member,
    }
}

#[async_trait]
impl TrendStore for RedisTrendStore {
    async fn append(
        &self,
        log: &TrendLog,
        subject: &str,
        occurrence: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let key = log.key();
        let member = format!("{}|{}", subject, occurrence);
        redis::cmd("ZADD")
            .arg(&key)
            .arg(at.timestamp_millis())
            .arg(member)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| redis_error("ZADD", &key, e))?;
        Ok(())
    }

    async fn window(&self, log: &TrendLog, since: DateTime<Utc>) -> Result<Vec<String>> {
        let key = log.key();
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&key)
            .arg(since.timestamp_millis())
            .arg("+inf")
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| redis_error("ZRANGEBYSCORE", &key, e))?;
        Ok(members.into_iter().map(strip_occurrence_suffix).collect())
    }

    async fn load_snapshot(&self, kind: TrendKind) -> Result<Option<String>> {
        let key = kind.snapshot_key();
        let raw: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut self.conn.clone())
            .await
            .map_err(|e| redis_error("GET", &key, e))?;
        Ok(raw)
    }

    async fn store_snapshot(&self, kind: TrendKind, raw: &str, ttl: Duration) -> Result<()> {
        let key = kind.snapshot_key();
        redis::cmd("SET")
            .arg(&key)
            .arg(raw)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| redis_error("SET", &key, e))?;
        Ok(())
    }

    async fn delete_snapshot(&self, kind: TrendKind) -> Result<()> {
        let key = kind.snapshot_key();
        redis::cmd("DEL")
            .arg(&key)
            .query_async::<_, ()>(&mut self.conn.clone())
            .await
            .map_err(|e| redis_error("DEL", &key, e))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LogEntry {
    at: DateTime<Utc>,
    subject: String,
    occurrence: String,
}

/// Process-local trend store. Snapshot expiry is left to the aggregator,
/// which checks `computed_at + ttl` itself.
#[derive(Default)]
pub struct InMemoryTrendStore {
    logs: DashMap<String, Vec<LogEntry>>,
    snapshots: DashMap<TrendKind, String>,
}

impl InMemoryTrendStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrendStore for InMemoryTrendStore {
    async fn append(
        &self,
        log: &TrendLog,
        subject: &str,
        occurrence: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut entries = self.logs.entry(log.key()).or_default();
        entries.retain(|e| !(e.subject == subject && e.occurrence == occurrence));
        let position = entries.partition_point(|e| e.at <= at);
        entries.insert(
            position,
            LogEntry {
                at,
                subject: subject.to_string(),
                occurrence: occurrence.to_string(),
            },
        );
        Ok(())
    }

    async fn window(&self, log: &TrendLog, since: DateTime<Utc>) -> Result<Vec<String>> {
        Ok(self
            .logs
            .get(&log.key())
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.at >= since)
                    .map(|e| e.subject.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn load_snapshot(&self, kind: TrendKind) -> Result<Option<String>> {
        Ok(self.snapshots.get(&kind).map(|raw| raw.clone()))
    }

    async fn store_snapshot(&self, kind: TrendKind, raw: &str, _ttl: Duration) -> Result<()> {
        self.snapshots.insert(kind, raw.to_string());
        Ok(())
    }

    async fn delete_snapshot(&self, kind: TrendKind) -> Result<()> {
        self.snapshots.remove(&kind);
        Ok(())
    }
}
