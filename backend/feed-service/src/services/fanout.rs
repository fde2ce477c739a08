//! Push path: react to content-lifecycle events by writing into (or pruning)
//! the ranked feeds of everyone affected.
//!
//! Delivery is best-effort. A failed follower lookup is treated as "no
//! followers", a failed write into one follower's feed is logged and counted
//! and the remaining followers still receive the entry. Only writes to the
//! acting user's own feed propagate errors back to the consumer. Every
//! handler is an upsert or a removal, so redelivered events are harmless.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::trending::TrendAggregator;
use super::FeedContext;
use crate::error::Result;
use crate::metrics::feed as feed_metrics;
use crate::models::events::{
    ContentCreated, ContentDeleted, FollowChanged, HashtagUsed, LikeChanged, RetweetCreated,
    UserBlocked,
};
use crate::models::{AuthToken, ContentSummary, FeedEntry, FeedEvent};

/// Follower feeds written concurrently for one event.
const FANOUT_CONCURRENCY: usize = 16;

pub struct FanOutProcessor {
    ctx: FeedContext,
    trends: Arc<TrendAggregator>,
    bootstrap_count: usize,
    service_token: AuthToken,
}

impl FanOutProcessor {
    pub fn new(
        ctx: FeedContext,
        trends: Arc<TrendAggregator>,
        bootstrap_count: usize,
        service_token: AuthToken,
    ) -> Self {
        Self {
            ctx,
            trends,
            bootstrap_count,
            service_token,
        }
    }

    /// Apply one event. Returns the number of feed entries written or removed.
    pub async fn handle(&self, event: &FeedEvent) -> Result<usize> {
        let result = match event {
            FeedEvent::ContentCreated(e) => self.on_content_created(e).await,
            FeedEvent::RetweetCreated(e) => self.on_retweet_created(e).await,
            FeedEvent::LikeSet(e) => self.on_like_set(e).await,
            FeedEvent::LikeCanceled(e) => {
                // likes are append-only in the trend log and feeds are not re-scored
                debug!(user_id = %e.user_id, content_id = %e.content_id, "Ignoring like-canceled");
                Ok(0)
            }
            FeedEvent::UserFollowed(e) => self.on_user_followed(e).await,
            FeedEvent::UserUnfollowed(e) => self.on_user_unfollowed(e).await,
            FeedEvent::UserBlocked(e) => self.on_user_blocked(e).await,
            FeedEvent::ContentDeleted(e) => self.on_content_deleted(e).await,
            FeedEvent::HashtagUsed(e) => self.on_hashtag_used(e).await,
        };

        let status = if result.is_ok() { "ok" } else { "error" };
        feed_metrics::record_fanout_event(event.subject(), status);
        result
    }

    async fn on_content_created(&self, event: &ContentCreated) -> Result<usize> {
        let now = self.ctx.clock.now();
        let created_at = event.created_at.unwrap_or(now);
        let entry = FeedEntry::new(
            event.id,
            event.author_id,
            self.ctx.scorer.score(created_at, 0, 0, now),
        );

        {
            let _guard = self.ctx.locks.lock(event.author_id).await;
            self.ctx.store.insert(event.author_id, entry.clone()).await?;
        }

        let followers = self.followers_of(event.author_id).await;
        let delivered = self.push_to(&followers, &entry).await;

        for tag in &event.hashtags {
            if let Err(e) = self
                .trends
                .record_hashtag_usage(tag, Some(event.id), Some(created_at))
                .await
            {
                warn!(content_id = %event.id, tag = %tag, error = %e, "Failed to record hashtag usage");
            }
        }

        info!(
            content_id = %event.id,
            author_id = %event.author_id,
            followers = followers.len(),
            delivered,
            "Fanned out new content"
        );
        Ok(delivered + 1)
    }

    async fn on_retweet_created(&self, event: &RetweetCreated) -> Result<usize> {
        let Some(original) = self.lookup(event.parent_content_id).await else {
            return Ok(0);
        };
        let entry = self.entry_for(&original);

        let followers = self.followers_of(event.author_id).await;
        let delivered = self.push_to(&followers, &entry).await;
        debug!(
            retweeter = %event.author_id,
            content_id = %original.id,
            delivered,
            "Fanned out retweeted content"
        );
        Ok(delivered)
    }

    async fn on_like_set(&self, event: &LikeChanged) -> Result<usize> {
        if let Err(e) = self
            .trends
            .record_like(event.content_id, event.user_id, event.at)
            .await
        {
            warn!(content_id = %event.content_id, error = %e, "Failed to record like for trends");
        }

        let Some(liked) = self.lookup(event.content_id).await else {
            return Ok(0);
        };
        let entry = self.entry_for(&liked);

        let followers = self.followers_of(event.user_id).await;
        let delivered = self.push_to(&followers, &entry).await;
        debug!(liker = %event.user_id, content_id = %liked.id, delivered, "Fanned out liked content");
        Ok(delivered)
    }

    async fn on_user_followed(&self, event: &FollowChanged) -> Result<usize> {
        self.ctx
            .followers
            .add_follower(event.followee_id, event.follower_id);

        let recent = match self
            .ctx
            .content
            .get_recent_by_author(event.followee_id, self.bootstrap_count, &self.service_token)
            .await
        {
            Ok(recent) => recent,
            Err(e) => {
                feed_metrics::record_fanout_failure("content_lookup");
                warn!(
                    followee_id = %event.followee_id,
                    error = %e,
                    "Failed to load followee content for bootstrap"
                );
                return Ok(0);
            }
        };

        let entries: Vec<FeedEntry> = recent
            .iter()
            .take(self.bootstrap_count)
            .map(|summary| self.entry_for(summary))
            .collect();
        if entries.is_empty() {
            return Ok(0);
        }

        let _guard = self.ctx.locks.lock(event.follower_id).await;
        self.ctx
            .store
            .insert_batch(event.follower_id, &entries)
            .await?;
        feed_metrics::record_fanout_deliveries(entries.len());
        info!(
            follower_id = %event.follower_id,
            followee_id = %event.followee_id,
            bootstrapped = entries.len(),
            "Bootstrapped follower feed"
        );
        Ok(entries.len())
    }

    async fn on_user_unfollowed(&self, event: &FollowChanged) -> Result<usize> {
        self.ctx
            .followers
            .remove_follower(event.followee_id, event.follower_id);

        let _guard = self.ctx.locks.lock(event.follower_id).await;
        let removed = self
            .ctx
            .store
            .remove_by_author(event.follower_id, event.followee_id)
            .await?;
        debug!(
            follower_id = %event.follower_id,
            followee_id = %event.followee_id,
            removed,
            "Purged unfollowed author"
        );
        Ok(removed)
    }

    async fn on_user_blocked(&self, event: &UserBlocked) -> Result<usize> {
        let (blocker, blocked) = (event.blocker_id, event.blocked_id);
        self.ctx.followers.remove_follower(blocker, blocked);
        self.ctx.followers.remove_follower(blocked, blocker);

        let mut removed = 0;
        for (owner, author) in [(blocker, blocked), (blocked, blocker)] {
            let _guard = self.ctx.locks.lock(owner).await;
            removed += self.ctx.store.remove_by_author(owner, author).await?;
        }
        debug!(blocker = %blocker, blocked = %blocked, removed, "Purged blocked relationship");
        Ok(removed)
    }

    async fn on_content_deleted(&self, event: &ContentDeleted) -> Result<usize> {
        let mut removed = 0;
        if self
            .ctx
            .store
            .remove_by_content(event.author_id, event.id)
            .await?
        {
            removed += 1;
        }

        for follower in self.followers_of(event.author_id).await {
            match self.ctx.store.remove_by_content(follower, event.id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    feed_metrics::record_fanout_failure("remove");
                    warn!(follower_id = %follower, content_id = %event.id, error = %e, "Failed to remove deleted content");
                }
            }
        }
        Ok(removed)
    }

    async fn on_hashtag_used(&self, event: &HashtagUsed) -> Result<usize> {
        self.trends
            .record_hashtag_usage(&event.tag, event.content_id, event.at)
            .await?;
        Ok(0)
    }

    fn entry_for(&self, summary: &ContentSummary) -> FeedEntry {
        let score = self.ctx.scorer.score(
            summary.created_at,
            summary.likes,
            summary.retweets,
            self.ctx.clock.now(),
        );
        FeedEntry::new(summary.id, summary.author_id, score)
    }

    async fn followers_of(&self, user_id: Uuid) -> HashSet<Uuid> {
        match self
            .ctx
            .followers
            .get_followers(user_id, &self.service_token)
            .await
        {
            Ok(followers) => followers,
            Err(e) => {
                feed_metrics::record_fanout_failure("followers");
                warn!(user_id = %user_id, error = %e, "Follower lookup failed, skipping fan-out");
                HashSet::new()
            }
        }
    }

    async fn lookup(&self, content_id: Uuid) -> Option<ContentSummary> {
        match self
            .ctx
            .content
            .get_by_ids(&[content_id], &self.service_token)
            .await
        {
            Ok(items) => {
                let found = items.into_iter().find(|c| c.id == content_id);
                if found.is_none() {
                    debug!(content_id = %content_id, "Content not found, skipping fan-out");
                }
                found
            }
            Err(e) => {
                feed_metrics::record_fanout_failure("content_lookup");
                warn!(content_id = %content_id, error = %e, "Content lookup failed, skipping fan-out");
                None
            }
        }
    }

    /// Insert `entry` into every follower's feed. Returns successful writes.
    async fn push_to(&self, followers: &HashSet<Uuid>, entry: &FeedEntry) -> usize {
        let delivered = stream::iter(followers.iter().copied())
            .map(|follower| async move {
                let _guard = self.ctx.locks.lock(follower).await;
                match self.ctx.store.insert(follower, entry.clone()).await {
                    Ok(()) => true,
                    Err(e) => {
                        feed_metrics::record_fanout_failure("insert");
                        warn!(
                            follower_id = %follower,
                            content_id = %entry.content_id,
                            error = %e,
                            "Failed to push entry to follower feed"
                        );
                        false
                    }
                }
            })
            .buffer_unordered(FANOUT_CONCURRENCY)
            .filter(|ok| futures::future::ready(*ok))
            .count()
            .await;
        feed_metrics::record_fanout_deliveries(delivered);
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MockContentClient, MockProfileClient};
    use crate::config::TrendingConfig;
    use crate::error::AppError;
    use crate::services::follower_cache::FollowerSnapshotCache;
    use crate::services::ranked_store::{InMemoryFeedStore, RankedFeedStore};
    use crate::services::trending::InMemoryTrendStore;
    use crate::services::{OwnerLocks, ScoreEngine};
    use crate::utils::clock::ManualClock;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryFeedStore>,
        trends: Arc<TrendAggregator>,
        locks: Arc<OwnerLocks>,
        processor: FanOutProcessor,
    }

    fn harness(profiles: MockProfileClient, content: MockContentClient) -> Harness {
        let clock = ManualClock::new(Utc::now());
        let shared_clock: crate::utils::clock::SharedClock = Arc::new(clock);
        let store = Arc::new(InMemoryFeedStore::new(100));
        let followers = Arc::new(FollowerSnapshotCache::new(
            Arc::new(profiles),
            shared_clock.clone(),
            Duration::from_secs(600),
        ));
        let trends = Arc::new(TrendAggregator::new(
            Arc::new(InMemoryTrendStore::new()),
            shared_clock.clone(),
            TrendingConfig::default(),
        ));
        let locks = Arc::new(OwnerLocks::new());
        let ctx = FeedContext {
            store: store.clone(),
            followers,
            content: Arc::new(content),
            scorer: ScoreEngine::default(),
            locks: locks.clone(),
            clock: shared_clock,
        };
        Harness {
            store,
            trends: trends.clone(),
            locks,
            processor: FanOutProcessor::new(ctx, trends, 30, AuthToken::bearer("svc")),
        }
    }

    fn followers_of(owner: Uuid, followers: Vec<Uuid>) -> MockProfileClient {
        let mut profiles = MockProfileClient::new();
        profiles
            .expect_get_followers()
            .returning(move |user, _| Ok(if user == owner { followers.clone() } else { Vec::new() }));
        profiles
    }

    fn summary(id: Uuid, author_id: Uuid, likes: u64) -> ContentSummary {
        ContentSummary {
            id,
            author_id,
            body: format!("tweet {}", id),
            hashtags: Vec::new(),
            created_at: Utc::now() - ChronoDuration::hours(1),
            likes,
            retweets: 0,
        }
    }

    async fn feed_ids(store: &InMemoryFeedStore, owner: Uuid) -> Vec<Uuid> {
        store
            .page(owner, 0, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.content_id)
            .collect()
    }

    fn created(id: Uuid, author_id: Uuid, hashtags: &[&str]) -> FeedEvent {
        FeedEvent::ContentCreated(ContentCreated {
            id,
            author_id,
            hashtags: hashtags.iter().map(|t| t.to_string()).collect(),
            created_at: None,
        })
    }

    #[tokio::test]
    async fn owner_locks_are_released_after_wide_fanout() {
        let author = Uuid::new_v4();
        let followers: Vec<Uuid> = (0..500).map(|_| Uuid::new_v4()).collect();
        let h = harness(followers_of(author, followers), MockContentClient::new());

        for _ in 0..3 {
            h.processor
                .handle(&created(Uuid::new_v4(), author, &[]))
                .await
                .unwrap();
        }

        assert_eq!(h.store.len(author).await.unwrap(), 3);
        assert!(h.locks.is_empty());
    }

    #[tokio::test]
    async fn new_content_reaches_author_and_followers() {
        let author = Uuid::new_v4();
        let (f1, f2) = (Uuid::new_v4(), Uuid::new_v4());
        let h = harness(followers_of(author, vec![f1, f2]), MockContentClient::new());
        let content = Uuid::new_v4();

        let written = h
            .processor
            .handle(&created(content, author, &["Rust"]))
            .await
            .unwrap();

        assert_eq!(written, 3);
        for owner in [author, f1, f2] {
            assert_eq!(feed_ids(&h.store, owner).await, vec![content]);
        }
        assert_eq!(h.trends.top_hashtags(1, 5).await.unwrap(), vec!["rust"]);
        assert_eq!(
            h.trends.tagged_content("rust", 5).await.unwrap(),
            vec![content]
        );
    }

    #[tokio::test]
    async fn follower_lookup_failure_keeps_own_feed() {
        let author = Uuid::new_v4();
        let mut profiles = MockProfileClient::new();
        profiles
            .expect_get_followers()
            .returning(|_, _| Err(AppError::UpstreamUnavailable("profile down".into())));
        let h = harness(profiles, MockContentClient::new());
        let content = Uuid::new_v4();

        let written = h.processor.handle(&created(content, author, &[])).await.unwrap();
        assert_eq!(written, 1);
        assert_eq!(feed_ids(&h.store, author).await, vec![content]);
    }

    #[tokio::test]
    async fn own_feed_failure_propagates() {
        let h = harness(MockProfileClient::new(), MockContentClient::new());
        h.store.set_unavailable(true);

        let err = h
            .processor
            .handle(&created(Uuid::new_v4(), Uuid::new_v4(), &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn retweet_pushes_original_content() {
        let retweeter = Uuid::new_v4();
        let original_author = Uuid::new_v4();
        let follower = Uuid::new_v4();
        let parent = Uuid::new_v4();

        let mut content = MockContentClient::new();
        content
            .expect_get_by_ids()
            .returning(move |ids, _| Ok(ids.iter().map(|id| summary(*id, original_author, 2)).collect()));
        let h = harness(followers_of(retweeter, vec![follower]), content);

        let written = h
            .processor
            .handle(&FeedEvent::RetweetCreated(RetweetCreated {
                author_id: retweeter,
                parent_content_id: parent,
            }))
            .await
            .unwrap();

        assert_eq!(written, 1);
        let page = h.store.page(follower, 0, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].content_id, parent);
        assert_eq!(page[0].author_id, original_author);
        assert!(feed_ids(&h.store, retweeter).await.is_empty());
    }

    #[tokio::test]
    async fn missing_parent_skips_retweet() {
        let mut content = MockContentClient::new();
        content.expect_get_by_ids().returning(|_, _| Ok(Vec::new()));
        let h = harness(MockProfileClient::new(), content);

        let written = h
            .processor
            .handle(&FeedEvent::RetweetCreated(RetweetCreated {
                author_id: Uuid::new_v4(),
                parent_content_id: Uuid::new_v4(),
            }))
            .await
            .unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn like_pushes_to_likers_followers_and_counts_trend() {
        let liker = Uuid::new_v4();
        let follower = Uuid::new_v4();
        let liked = Uuid::new_v4();
        let author = Uuid::new_v4();

        let mut content = MockContentClient::new();
        content
            .expect_get_by_ids()
            .returning(move |ids, _| Ok(ids.iter().map(|id| summary(*id, author, 10)).collect()));
        let h = harness(followers_of(liker, vec![follower]), content);

        h.processor
            .handle(&FeedEvent::LikeSet(LikeChanged {
                user_id: liker,
                content_id: liked,
                at: None,
            }))
            .await
            .unwrap();

        assert_eq!(feed_ids(&h.store, follower).await, vec![liked]);
        assert_eq!(h.trends.top_tweet_ids(1, 10).await.unwrap(), vec![liked]);
    }

    #[tokio::test]
    async fn like_canceled_changes_nothing() {
        let h = harness(MockProfileClient::new(), MockContentClient::new());
        let written = h
            .processor
            .handle(&FeedEvent::LikeCanceled(LikeChanged {
                user_id: Uuid::new_v4(),
                content_id: Uuid::new_v4(),
                at: None,
            }))
            .await
            .unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn follow_bootstraps_and_unfollow_purges() {
        let follower = Uuid::new_v4();
        let followee = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut content = MockContentClient::new();
        content
            .expect_get_recent_by_author()
            .withf(move |author, count, _| *author == followee && *count == 30)
            .returning(move |author, _, _| {
                Ok((0..3).map(|_| summary(Uuid::new_v4(), author, 0)).collect())
            });
        let h = harness(MockProfileClient::new(), content);
        h.store
            .insert(follower, FeedEntry::new(Uuid::new_v4(), other, 1.0))
            .await
            .unwrap();

        let event = FollowChanged {
            follower_id: follower,
            followee_id: followee,
            at: None,
        };
        assert_eq!(
            h.processor
                .handle(&FeedEvent::UserFollowed(event.clone()))
                .await
                .unwrap(),
            3
        );
        assert_eq!(h.store.len(follower).await.unwrap(), 4);

        assert_eq!(
            h.processor
                .handle(&FeedEvent::UserUnfollowed(event))
                .await
                .unwrap(),
            3
        );
        let remaining = h.store.page(follower, 0, 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].author_id, other);
    }

    #[tokio::test]
    async fn block_purges_both_directions() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let h = harness(MockProfileClient::new(), MockContentClient::new());
        h.store
            .insert(a, FeedEntry::new(Uuid::new_v4(), b, 1.0))
            .await
            .unwrap();
        h.store
            .insert(b, FeedEntry::new(Uuid::new_v4(), a, 1.0))
            .await
            .unwrap();

        let removed = h
            .processor
            .handle(&FeedEvent::UserBlocked(UserBlocked {
                blocker_id: a,
                blocked_id: b,
                at: None,
            }))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(h.store.len(a).await.unwrap(), 0);
        assert_eq!(h.store.len(b).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn deleted_content_leaves_every_feed() {
        let author = Uuid::new_v4();
        let follower = Uuid::new_v4();
        let h = harness(followers_of(author, vec![follower]), MockContentClient::new());
        let content = Uuid::new_v4();

        h.processor.handle(&created(content, author, &[])).await.unwrap();
        let removed = h
            .processor
            .handle(&FeedEvent::ContentDeleted(ContentDeleted {
                id: content,
                author_id: author,
            }))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert!(feed_ids(&h.store, follower).await.is_empty());
    }

    #[tokio::test]
    async fn redelivered_content_is_idempotent() {
        let author = Uuid::new_v4();
        let follower = Uuid::new_v4();
        let h = harness(followers_of(author, vec![follower]), MockContentClient::new());
        let event = created(Uuid::new_v4(), author, &[]);

        h.processor.handle(&event).await.unwrap();
        h.processor.handle(&event).await.unwrap();
        assert_eq!(h.store.len(follower).await.unwrap(), 1);
    }
}
