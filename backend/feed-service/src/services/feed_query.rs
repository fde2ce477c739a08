//! Read path in front of the ranked store.

use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::feed_builder::{resolve_in_order, FeedBuilder};
use super::ranked_store::RankedFeedStore;
use crate::clients::ContentClient;
use crate::error::{AppError, Result};
use crate::metrics::feed as feed_metrics;
use crate::models::{AuthToken, FeedPage};

pub struct FeedQueryService {
    store: Arc<dyn RankedFeedStore>,
    builder: Arc<FeedBuilder>,
    content: Arc<dyn ContentClient>,
    max_page_size: usize,
}

impl FeedQueryService {
    pub fn new(
        store: Arc<dyn RankedFeedStore>,
        builder: Arc<FeedBuilder>,
        content: Arc<dyn ContentClient>,
        max_page_size: usize,
    ) -> Self {
        Self {
            store,
            builder,
            content,
            max_page_size,
        }
    }

    /// One page of `user_id`'s feed starting at `cursor`.
    ///
    /// An empty page triggers a rebuild; the rebuilt feed is then served
    /// from offset 0 and the response is flagged `rebuilt`.
    pub async fn get_feed(
        &self,
        user_id: Uuid,
        cursor: i64,
        page_size: i64,
        auth: &AuthToken,
    ) -> Result<FeedPage> {
        if page_size <= 0 {
            return Err(AppError::Validation("pageSize must be positive".to_string()));
        }
        if cursor < 0 {
            return Err(AppError::Validation("cursor must not be negative".to_string()));
        }
        let page_size = (page_size as usize).min(self.max_page_size);
        let mut cursor = cursor as usize;
        let mut rebuilt = false;

        let mut entries = self.store.page(user_id, cursor, page_size).await?;
        if entries.is_empty() {
            debug!(user_id = %user_id, cursor, "Empty feed page, rebuilding");
            self.builder.build(user_id, auth).await?;
            cursor = 0;
            rebuilt = true;
            entries = self.store.page(user_id, cursor, page_size).await?;
        }

        let total_count = self.store.len(user_id).await?;
        let read = entries.len();
        let next_cursor = cursor + read;

        let ids: Vec<_> = entries.iter().map(|e| e.content_id).collect();
        let items = if ids.is_empty() {
            Vec::new()
        } else {
            resolve_in_order(&ids, self.content.get_by_ids(&ids, auth).await?)
        };

        let outcome = match (rebuilt, read) {
            (_, 0) => "empty",
            (true, _) => "rebuilt",
            (false, _) => "hit",
        };
        feed_metrics::record_feed_read(outcome);

        Ok(FeedPage {
            items,
            total_count,
            has_more: next_cursor < total_count,
            next_cursor,
            rebuilt,
        })
    }

    pub async fn remove_from_feed(&self, user_id: Uuid, content_id: Uuid) -> Result<bool> {
        let removed = self.store.remove_by_content(user_id, content_id).await?;
        debug!(user_id = %user_id, content_id = %content_id, removed, "Removed content from feed");
        Ok(removed)
    }

    pub async fn remove_user_tweets_from_feed(&self, user_id: Uuid, author_id: Uuid) -> Result<usize> {
        let removed = self.store.remove_by_author(user_id, author_id).await?;
        info!(user_id = %user_id, author_id = %author_id, removed, "Removed author from feed");
        Ok(removed)
    }

    pub async fn rebuild_feed(&self, user_id: Uuid, auth: &AuthToken) -> Result<usize> {
        self.builder.build(user_id, auth).await
    }

    pub async fn get_feed_size(&self, user_id: Uuid) -> Result<usize> {
        self.store.len(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MockContentClient, MockProfileClient, MockTrendSource};
    use crate::config::FeedConfig;
    use crate::models::{ContentSummary, FeedEntry};
    use crate::services::ranked_store::InMemoryFeedStore;
    use crate::services::{FeedContext, FollowerSnapshotCache, OwnerLocks, ScoreEngine};
    use crate::utils::clock::{ManualClock, SharedClock};
    use chrono::Utc;
    use std::time::Duration;

    fn summary(id: Uuid, author_id: Uuid) -> ContentSummary {
        ContentSummary {
            id,
            author_id,
            body: "hello".to_string(),
            hashtags: Vec::new(),
            created_at: Utc::now(),
            likes: 0,
            retweets: 0,
        }
    }

    fn echo_content() -> MockContentClient {
        let mut content = MockContentClient::new();
        content
            .expect_get_by_ids()
            .returning(|ids, _| Ok(ids.iter().map(|id| summary(*id, Uuid::nil())).collect()));
        content
    }

    fn service(
        profiles: MockProfileClient,
        builder_content: MockContentClient,
        trends: MockTrendSource,
        max_page_size: usize,
    ) -> (FeedQueryService, Arc<InMemoryFeedStore>) {
        let clock: SharedClock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(InMemoryFeedStore::new(100));
        let builder_content: Arc<dyn ContentClient> = Arc::new(builder_content);
        let ctx = FeedContext {
            store: store.clone(),
            followers: Arc::new(FollowerSnapshotCache::new(
                Arc::new(profiles),
                clock.clone(),
                Duration::from_secs(600),
            )),
            content: builder_content.clone(),
            scorer: ScoreEngine::default(),
            locks: Arc::new(OwnerLocks::new()),
            clock,
        };
        let builder = Arc::new(FeedBuilder::new(ctx, Arc::new(trends), FeedConfig::default()));
        (
            FeedQueryService::new(store.clone(), builder, builder_content, max_page_size),
            store,
        )
    }

    async fn seeded(count: usize) -> (FeedQueryService, Arc<InMemoryFeedStore>, Uuid) {
        let (svc, store) = service(
            MockProfileClient::new(),
            echo_content(),
            MockTrendSource::new(),
            100,
        );
        let user = Uuid::new_v4();
        let entries: Vec<FeedEntry> = (0..count)
            .map(|i| FeedEntry::new(Uuid::new_v4(), Uuid::new_v4(), i as f64))
            .collect();
        store.insert_batch(user, &entries).await.unwrap();
        (svc, store, user)
    }

    #[tokio::test]
    async fn rejects_invalid_pagination() {
        let (svc, _, user) = seeded(1).await;
        let auth = AuthToken::none();
        assert!(matches!(
            svc.get_feed(user, 0, 0, &auth).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            svc.get_feed(user, -1, 10, &auth).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn pages_through_feed() {
        let (svc, _, user) = seeded(5).await;
        let auth = AuthToken::none();

        let first = svc.get_feed(user, 0, 3, &auth).await.unwrap();
        assert_eq!(first.items.len(), 3);
        assert_eq!(first.total_count, 5);
        assert!(first.has_more);
        assert_eq!(first.next_cursor, 3);
        assert!(!first.rebuilt);

        let second = svc.get_feed(user, 3, 3, &auth).await.unwrap();
        assert_eq!(second.items.len(), 2);
        assert!(!second.has_more);
        assert_eq!(second.next_cursor, 5);
    }

    #[tokio::test]
    async fn page_size_is_clamped() {
        let (svc, _, user) = seeded(40).await;
        let svc = FeedQueryService { max_page_size: 25, ..svc };
        let page = svc.get_feed(user, 0, 1_000, &AuthToken::none()).await.unwrap();
        assert_eq!(page.items.len(), 25);
    }

    #[tokio::test]
    async fn missing_content_is_dropped_but_cursor_advances() {
        let (svc, store, user) = seeded(3).await;
        let gone = store.page(user, 1, 1).await.unwrap()[0].content_id;

        let mut content = MockContentClient::new();
        content.expect_get_by_ids().returning(move |ids, _| {
            Ok(ids
                .iter()
                .filter(|id| **id != gone)
                .map(|id| summary(*id, Uuid::nil()))
                .collect())
        });
        let svc = FeedQueryService {
            content: Arc::new(content),
            ..svc
        };

        let page = svc.get_feed(user, 0, 3, &AuthToken::none()).await.unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor, 3);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn empty_feed_is_rebuilt_from_offset_zero() {
        let followee = Uuid::new_v4();
        let mut profiles = MockProfileClient::new();
        profiles
            .expect_get_followings()
            .returning(move |_, _, _| Ok(vec![followee]));
        profiles.expect_get_blocked().returning(|_, _| Ok(Vec::new()));

        let mut content = echo_content();
        content
            .expect_get_recent_by_author()
            .returning(|author, _, _| Ok(vec![summary(Uuid::new_v4(), author)]));

        let mut trends = MockTrendSource::new();
        trends.expect_trend_tweet_ids().returning(|_| Ok(Vec::new()));
        trends.expect_trend_categories().returning(|_| Ok(Vec::new()));

        let (svc, _) = service(profiles, content, trends, 100);
        let user = Uuid::new_v4();

        let page = svc
            .get_feed(user, 40, 10, &AuthToken::bearer("t"))
            .await
            .unwrap();
        assert!(page.rebuilt);
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.next_cursor, 1);
        assert_eq!(page.total_count, 1);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn removal_and_size_delegate_to_store() {
        let (svc, store, user) = seeded(3).await;
        let first = store.page(user, 0, 1).await.unwrap().remove(0);

        assert!(svc.remove_from_feed(user, first.content_id).await.unwrap());
        assert_eq!(svc.get_feed_size(user).await.unwrap(), 2);
        assert_eq!(
            svc.remove_user_tweets_from_feed(user, first.author_id).await.unwrap(),
            0
        );
    }
}
