//! Pull path: rebuild a user's feed from scratch.
//!
//! Recent content from the people the user follows comes first; whatever
//! room is left under the feed cap is filled with global and per-hashtag
//! trending content. The result replaces the stored feed in one swap while
//! the owner lock is held, so fan-out writes for the same user wait instead
//! of being wiped by the rebuild.

use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::FeedContext;
use crate::clients::TrendSource;
use crate::config::FeedConfig;
use crate::error::Result;
use crate::metrics::feed as feed_metrics;
use crate::models::{AuthToken, ContentSummary, FeedEntry};

/// Per-author timeline requests in flight during one rebuild.
const AUTHOR_FETCH_CONCURRENCY: usize = 8;

pub struct FeedBuilder {
    ctx: FeedContext,
    trends: Arc<dyn TrendSource>,
    config: FeedConfig,
}

impl FeedBuilder {
    pub fn new(ctx: FeedContext, trends: Arc<dyn TrendSource>, config: FeedConfig) -> Self {
        Self {
            ctx,
            trends,
            config,
        }
    }

    /// Rebuild `user_id`'s feed. Returns the number of entries stored.
    pub async fn build(&self, user_id: Uuid, auth: &AuthToken) -> Result<usize> {
        let started = Instant::now();
        let _guard = self.ctx.locks.lock(user_id).await;

        let result = self.assemble(user_id, auth).await;
        let result = match result {
            Ok(entries) => self
                .ctx
                .store
                .replace(user_id, &entries)
                .await
                .map(|_| entries.len()),
            Err(e) => Err(e),
        };

        match &result {
            Ok(stored) => {
                feed_metrics::record_rebuild("success", started.elapsed());
                info!(
                    user_id = %user_id,
                    entries = stored,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Rebuilt feed"
                );
            }
            Err(e) => {
                feed_metrics::record_rebuild("error", started.elapsed());
                warn!(user_id = %user_id, error = %e, "Feed rebuild failed");
            }
        }
        result
    }

    async fn assemble(&self, user_id: Uuid, auth: &AuthToken) -> Result<Vec<FeedEntry>> {
        let following_content = self.following_content(user_id, auth).await?;

        let budget = self
            .config
            .max_feed_size
            .saturating_sub(following_content.len());
        let known: HashSet<Uuid> = following_content.iter().map(|c| c.id).collect();
        let trend_content = if budget > 0 {
            self.trend_content(&known, budget, auth).await?
        } else {
            Vec::new()
        };

        let blocked = self.ctx.followers.get_blocked(user_id, auth).await?;
        let now = self.ctx.clock.now();
        let mut seen = HashSet::new();
        let entries: Vec<FeedEntry> = following_content
            .iter()
            .chain(trend_content.iter())
            .filter(|c| !blocked.contains(&c.author_id))
            .filter(|c| seen.insert(c.id))
            .map(|c| {
                FeedEntry::new(
                    c.id,
                    c.author_id,
                    self.ctx.scorer.score(c.created_at, c.likes, c.retweets, now),
                )
            })
            .collect();

        debug!(
            user_id = %user_id,
            from_followings = following_content.len(),
            from_trends = trend_content.len(),
            blocked = blocked.len(),
            kept = entries.len(),
            "Assembled feed candidates"
        );
        Ok(entries)
    }

    async fn following_content(
        &self,
        user_id: Uuid,
        auth: &AuthToken,
    ) -> Result<Vec<ContentSummary>> {
        let followings = self
            .ctx
            .followers
            .get_followings(user_id, self.config.followings_max_count, auth)
            .await?;

        let per_author: Vec<Vec<ContentSummary>> = stream::iter(
            followings
                .into_iter()
                .take(self.config.followings_max_count),
        )
        .map(|author| {
            self.ctx.content.get_recent_by_author(
                author,
                self.config.tweets_by_each_following_max_count,
                auth,
            )
        })
        .buffered(AUTHOR_FETCH_CONCURRENCY)
        .try_collect()
        .await?;

        Ok(per_author
            .into_iter()
            .flat_map(|recent| {
                recent
                    .into_iter()
                    .take(self.config.tweets_by_each_following_max_count)
            })
            .take(self.config.all_followings_tweets_max_count)
            .collect())
    }

    async fn trend_content(
        &self,
        known: &HashSet<Uuid>,
        budget: usize,
        auth: &AuthToken,
    ) -> Result<Vec<ContentSummary>> {
        let mut ids = self
            .trends
            .trend_tweet_ids(self.config.trend_tweets_max_count)
            .await?;
        ids.truncate(self.config.trend_tweets_max_count);

        let categories = self
            .trends
            .trend_categories(self.config.trend_categories_max_count)
            .await?;
        for category in categories
            .iter()
            .take(self.config.trend_categories_max_count)
        {
            let mut tagged = self
                .trends
                .trend_tweet_ids_by_hashtag(
                    category,
                    self.config.trend_tweets_in_category_max_count,
                )
                .await?;
            tagged.truncate(self.config.trend_tweets_in_category_max_count);
            ids.extend(tagged);
        }

        let mut seen = HashSet::new();
        let ids: Vec<Uuid> = ids
            .into_iter()
            .filter(|id| !known.contains(id) && seen.insert(*id))
            .take(budget)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        Ok(resolve_in_order(&ids, self.ctx.content.get_by_ids(&ids, auth).await?))
    }
}

/// Arrange `items` in the order of `ids`, dropping ids the content service did not return.
pub(crate) fn resolve_in_order(ids: &[Uuid], items: Vec<ContentSummary>) -> Vec<ContentSummary> {
    let mut by_id: std::collections::HashMap<Uuid, ContentSummary> =
        items.into_iter().map(|c| (c.id, c)).collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}
