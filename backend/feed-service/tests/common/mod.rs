//! In-process stand-ins for the profile and content services plus a fully
//! wired service graph over the in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use feed_service::clients::{ContentClient, ProfileClient};
use feed_service::config::{FeedConfig, TrendingConfig};
use feed_service::error::Result;
use feed_service::models::{AuthToken, ContentSummary};
use feed_service::services::trending::InMemoryTrendStore;
use feed_service::services::{
    FanOutProcessor, FeedBuilder, FeedContext, FeedQueryService, FollowerSnapshotCache,
    InMemoryFeedStore, OwnerLocks, ScoreEngine, TrendAggregator,
};
use feed_service::utils::clock::{ManualClock, SharedClock};

#[derive(Default)]
pub struct FakeProfiles {
    followers: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
    blocked: Mutex<HashMap<Uuid, HashSet<Uuid>>>,
}

impl FakeProfiles {
    pub fn follow(&self, follower: Uuid, followee: Uuid) {
        self.followers
            .lock()
            .unwrap()
            .entry(followee)
            .or_default()
            .insert(follower);
    }

    pub fn unfollow(&self, follower: Uuid, followee: Uuid) {
        if let Some(set) = self.followers.lock().unwrap().get_mut(&followee) {
            set.remove(&follower);
        }
    }

    pub fn block(&self, blocker: Uuid, blocked: Uuid) {
        self.blocked
            .lock()
            .unwrap()
            .entry(blocker)
            .or_default()
            .insert(blocked);
        self.unfollow(blocker, blocked);
        self.unfollow(blocked, blocker);
    }
}

#[async_trait]
impl ProfileClient for FakeProfiles {
    async fn get_followers(&self, user_id: Uuid, _auth: &AuthToken) -> Result<Vec<Uuid>> {
        Ok(self
            .followers
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn get_followings(
        &self,
        user_id: Uuid,
        limit: usize,
        _auth: &AuthToken,
    ) -> Result<Vec<Uuid>> {
        Ok(self
            .followers
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, followers)| followers.contains(&user_id))
            .map(|(followee, _)| *followee)
            .take(limit)
            .collect())
    }

    async fn get_blocked(&self, user_id: Uuid, _auth: &AuthToken) -> Result<Vec<Uuid>> {
        Ok(self
            .blocked
            .lock()
            .unwrap()
            .get(&user_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeContent {
    items: Mutex<HashMap<Uuid, ContentSummary>>,
}

impl FakeContent {
    pub fn publish(
        &self,
        author_id: Uuid,
        hashtags: &[&str],
        created_at: DateTime<Utc>,
    ) -> ContentSummary {
        let summary = ContentSummary {
            id: Uuid::new_v4(),
            author_id,
            body: "post".to_string(),
            hashtags: hashtags.iter().map(|t| t.to_string()).collect(),
            created_at,
            likes: 0,
            retweets: 0,
        };
        self.items
            .lock()
            .unwrap()
            .insert(summary.id, summary.clone());
        summary
    }

    pub fn delete(&self, id: Uuid) {
        self.items.lock().unwrap().remove(&id);
    }
}

#[async_trait]
impl ContentClient for FakeContent {
    async fn get_by_ids(&self, ids: &[Uuid], _auth: &AuthToken) -> Result<Vec<ContentSummary>> {
        let items = self.items.lock().unwrap();
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    async fn get_recent_by_author(
        &self,
        author_id: Uuid,
        count: usize,
        _auth: &AuthToken,
    ) -> Result<Vec<ContentSummary>> {
        let mut recent: Vec<ContentSummary> = self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.author_id == author_id)
            .cloned()
            .collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        recent.truncate(count);
        Ok(recent)
    }
}

pub struct Harness {
    pub clock: ManualClock,
    pub profiles: Arc<FakeProfiles>,
    pub content: Arc<FakeContent>,
    pub store: Arc<InMemoryFeedStore>,
    pub trends: Arc<TrendAggregator>,
    pub processor: FanOutProcessor,
    pub query: Arc<FeedQueryService>,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::new(Utc::now());
        let shared_clock: SharedClock = Arc::new(clock.clone());
        let profiles = Arc::new(FakeProfiles::default());
        let content = Arc::new(FakeContent::default());
        let feed_config = FeedConfig::default();
        let store = Arc::new(InMemoryFeedStore::new(feed_config.max_feed_size));

        let trends = Arc::new(TrendAggregator::new(
            Arc::new(InMemoryTrendStore::new()),
            shared_clock.clone(),
            TrendingConfig::default(),
        ));

        let ctx = FeedContext {
            store: store.clone(),
            followers: Arc::new(FollowerSnapshotCache::new(
                profiles.clone(),
                shared_clock.clone(),
                Duration::from_secs(600),
            )),
            content: content.clone(),
            scorer: ScoreEngine::default(),
            locks: Arc::new(OwnerLocks::new()),
            clock: shared_clock,
        };

        let builder = Arc::new(FeedBuilder::new(
            ctx.clone(),
            trends.clone(),
            feed_config.clone(),
        ));
        let query = Arc::new(FeedQueryService::new(
            store.clone(),
            builder,
            content.clone(),
            feed_config.max_page_size,
        ));
        let processor = FanOutProcessor::new(
            ctx,
            trends.clone(),
            feed_config.bootstrap_count,
            AuthToken::bearer("service-token"),
        );

        Self {
            clock,
            profiles,
            content,
            store,
            trends,
            processor,
            query,
        }
    }

    pub fn minutes_ago(&self, minutes: i64) -> DateTime<Utc> {
        use feed_service::utils::clock::Clock;
        self.clock.now() - ChronoDuration::minutes(minutes)
    }
}
