use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::store::{TrendKind, TrendLog, TrendStore};
use crate::clients::TrendSource;
use crate::config::TrendingConfig;
use crate::error::{AppError, Result};
use crate::metrics::feed as feed_metrics;
use crate::utils::clock::SharedClock;

/// Cached ranking for one trend kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSnapshot {
    pub items: Vec<String>,
    pub computed_at: DateTime<Utc>,
    pub ttl_secs: u64,
    /// True when `items` holds every subject seen in the window, so a
    /// request past its end is answered from cache instead of recomputed.
    #[serde(default)]
    pub complete: bool,
}

impl TrendSnapshot {
    /// A TTL too large to represent never expires.
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        i64::try_from(self.ttl_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|ttl| self.computed_at.checked_add_signed(ttl))
            .map_or(true, |expires_at| now < expires_at)
    }

    fn covers(&self, needed: usize) -> bool {
        self.complete || self.items.len() >= needed
    }
}

pub struct TrendAggregator {
    store: Arc<dyn TrendStore>,
    clock: SharedClock,
    config: TrendingConfig,
}

impl TrendAggregator {
    pub fn new(store: Arc<dyn TrendStore>, clock: SharedClock, config: TrendingConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Record one use of `tag`, optionally linking it to the content it appeared in.
    ///
    /// A use tied to content counts once per content id however often it is
    /// recorded. Anonymous uses cannot be told apart and each one counts.
    pub async fn record_hashtag_usage(
        &self,
        tag: &str,
        content_id: Option<Uuid>,
        at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let Some(tag) = normalize_hashtag(tag) else {
            return Ok(());
        };
        let at = at.unwrap_or_else(|| self.clock.now());
        let occurrence = content_id.unwrap_or_else(Uuid::new_v4).simple().to_string();
        self.store
            .append(&TrendLog::HashtagUsage, &tag, &occurrence, at)
            .await?;
        if let Some(content_id) = content_id {
            let content_id = content_id.to_string();
            self.store
                .append(&TrendLog::TaggedContent(tag), &content_id, &content_id, at)
                .await?;
        }
        Ok(())
    }

    /// Record `user_id` liking `content_id`. Each user counts once per content.
    pub async fn record_like(
        &self,
        content_id: Uuid,
        user_id: Uuid,
        at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let at = at.unwrap_or_else(|| self.clock.now());
        self.store
            .append(
                &TrendLog::TweetLikes,
                &content_id.to_string(),
                &user_id.simple().to_string(),
                at,
            )
            .await
    }

    /// Most used hashtags in the window; `page` is 1-based.
    pub async fn top_hashtags(&self, page: usize, page_size: usize) -> Result<Vec<String>> {
        self.top(
            TrendKind::Hashtags,
            &TrendLog::HashtagUsage,
            self.config.hashtag_cache_size,
            page,
            page_size,
        )
        .await
    }

    /// Most liked content in the window; `page` is 1-based.
    pub async fn top_tweet_ids(&self, page: usize, page_size: usize) -> Result<Vec<Uuid>> {
        let items = self
            .top(
                TrendKind::Tweets,
                &TrendLog::TweetLikes,
                self.config.tweet_cache_size,
                page,
                page_size,
            )
            .await?;
        Ok(items
            .iter()
            .filter_map(|raw| Uuid::parse_str(raw).ok())
            .collect())
    }

    /// Most recent distinct content tagged with `tag` inside the window.
    pub async fn tagged_content(&self, tag: &str, count: usize) -> Result<Vec<Uuid>> {
        let Some(tag) = normalize_hashtag(tag) else {
            return Ok(Vec::new());
        };
        let subjects = self
            .store
            .window(&TrendLog::TaggedContent(tag), self.window_start())
            .await?;

        let mut seen = HashSet::new();
        Ok(subjects
            .iter()
            .rev()
            .filter_map(|raw| Uuid::parse_str(raw).ok())
            .filter(|id| seen.insert(*id))
            .take(count)
            .collect())
    }

    fn window_start(&self) -> DateTime<Utc> {
        self.clock.now() - ChronoDuration::hours(self.config.window_hours)
    }

    async fn top(
        &self,
        kind: TrendKind,
        log: &TrendLog,
        cache_size: usize,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<String>> {
        if page == 0 || page_size == 0 {
            return Err(AppError::Validation(
                "page and pageSize must be positive".to_string(),
            ));
        }
        let needed = page.saturating_mul(page_size);
        let skip = needed - page_size;

        if let Some(snapshot) = self.cached_snapshot(kind).await? {
            if snapshot.covers(needed) {
                feed_metrics::record_trend_snapshot(kind.as_str(), "hit");
                return Ok(slice(&snapshot.items, skip, page_size));
            }
        }
        feed_metrics::record_trend_snapshot(kind.as_str(), "miss");

        let ranked = rank_by_frequency(self.store.window(log, self.window_start()).await?);
        let snapshot = TrendSnapshot {
            complete: ranked.len() <= cache_size,
            items: ranked.iter().take(cache_size).cloned().collect(),
            computed_at: self.clock.now(),
            ttl_secs: self.config.snapshot_ttl_secs,
        };
        let raw = serde_json::to_string(&snapshot)
            .map_err(|e| AppError::Internal(format!("Trend snapshot serialization failed: {}", e)))?;
        self.store
            .store_snapshot(kind, &raw, Duration::from_secs(self.config.snapshot_ttl_secs))
            .await?;
        debug!(
            kind = kind.as_str(),
            distinct = ranked.len(),
            cached = snapshot.items.len(),
            "Recomputed trend snapshot"
        );

        Ok(slice(&ranked, skip, page_size))
    }

    /// Load an unexpired snapshot. Corrupt entries are deleted and treated as a miss.
    async fn cached_snapshot(&self, kind: TrendKind) -> Result<Option<TrendSnapshot>> {
        let Some(raw) = self.store.load_snapshot(kind).await? else {
            return Ok(None);
        };
        match serde_json::from_str::<TrendSnapshot>(&raw) {
            Ok(snapshot) if snapshot.is_fresh(self.clock.now()) => Ok(Some(snapshot)),
            Ok(_) => Ok(None),
            Err(e) => {
                let err = AppError::CacheCorrupt(format!("{} snapshot: {}", kind.as_str(), e));
                warn!(kind = kind.as_str(), error = %err, "Discarding corrupt trend snapshot");
                feed_metrics::record_trend_snapshot(kind.as_str(), "corrupt");
                if let Err(e) = self.store.delete_snapshot(kind).await {
                    warn!(kind = kind.as_str(), error = %e, "Failed to delete corrupt trend snapshot");
                }
                Ok(None)
            }
        }
    }
}

/// Trim whitespace and a leading `#`, lowercase. Empty tags are dropped.
pub fn normalize_hashtag(tag: &str) -> Option<String> {
    let tag = tag.trim().trim_start_matches('#').trim();
    if tag.is_empty() {
        None
    } else {
        Some(tag.to_lowercase())
    }
}

/// Distinct subjects ordered by occurrence count, ties broken lexicographically.
fn rank_by_frequency(subjects: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for subject in subjects {
        *counts.entry(subject).or_insert(0) += 1;
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|(a, ca), (b, cb)| cb.cmp(ca).then_with(|| a.cmp(b)));
    ranked.into_iter().map(|(subject, _)| subject).collect()
}

fn slice(items: &[String], skip: usize, take: usize) -> Vec<String> {
    items.iter().skip(skip).take(take).cloned().collect()
}

#[async_trait]
impl TrendSource for TrendAggregator {
    async fn trend_categories(&self, count: usize) -> Result<Vec<String>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.top_hashtags(1, count).await
    }

    async fn trend_tweet_ids(&self, count: usize) -> Result<Vec<Uuid>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        self.top_tweet_ids(1, count).await
    }

    async fn trend_tweet_ids_by_hashtag(&self, tag: &str, count: usize) -> Result<Vec<Uuid>> {
        self.tagged_content(tag, count).await
    }
}
