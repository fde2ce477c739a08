use async_trait::async_trait;
use dashmap::DashMap;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use uuid::Uuid;

use super::RankedFeedStore;
use crate::error::{AppError, Result};
use crate::models::FeedEntry;

/// Process-local store for tests and single-node development runs.
///
/// Orders entries exactly like the Redis backend so results are
/// interchangeable between the two.
pub struct InMemoryFeedStore {
    feeds: DashMap<Uuid, Vec<FeedEntry>>,
    max_feed_size: usize,
    unavailable: AtomicBool,
}

impl InMemoryFeedStore {
    pub fn new(max_feed_size: usize) -> Self {
        Self {
            feeds: DashMap::new(),
            max_feed_size,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate a backend outage: every operation fails with `StoreUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(AppError::StoreUnavailable(
                "in-memory feed store marked unavailable".to_string(),
            ));
        }
        Ok(())
    }

    fn upsert(feed: &mut Vec<FeedEntry>, entry: &FeedEntry) {
        match feed.iter_mut().find(|e| e.content_id == entry.content_id) {
            Some(existing) => {
                if entry.score > existing.score {
                    existing.score = entry.score;
                }
                existing.author_id = entry.author_id;
            }
            None => feed.push(entry.clone()),
        }
    }

    fn sort_and_trim(&self, feed: &mut Vec<FeedEntry>) {
        feed.sort_by(rank_order);
        feed.truncate(self.max_feed_size);
    }
}

fn rank_order(a: &FeedEntry, b: &FeedEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.content_id.cmp(&a.content_id))
}

#[async_trait]
impl RankedFeedStore for InMemoryFeedStore {
    async fn insert_batch(&self, owner: Uuid, entries: &[FeedEntry]) -> Result<()> {
        self.check_available()?;
        if entries.is_empty() {
            return Ok(());
        }
        let mut feed = self.feeds.entry(owner).or_default();
        for entry in entries {
            Self::upsert(&mut feed, entry);
        }
        self.sort_and_trim(&mut feed);
        Ok(())
    }

    async fn replace(&self, owner: Uuid, entries: &[FeedEntry]) -> Result<()> {
        self.check_available()?;
        let mut fresh = Vec::with_capacity(entries.len());
        for entry in entries {
            Self::upsert(&mut fresh, entry);
        }
        self.sort_and_trim(&mut fresh);
        if fresh.is_empty() {
            self.feeds.remove(&owner);
        } else {
            self.feeds.insert(owner, fresh);
        }
        Ok(())
    }

    async fn page(&self, owner: Uuid, start: usize, count: usize) -> Result<Vec<FeedEntry>> {
        self.check_available()?;
        Ok(self
            .feeds
            .get(&owner)
            .map(|feed| feed.iter().skip(start).take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn len(&self, owner: Uuid) -> Result<usize> {
        self.check_available()?;
        Ok(self.feeds.get(&owner).map(|feed| feed.len()).unwrap_or(0))
    }

    async fn clear(&self, owner: Uuid) -> Result<()> {
        self.check_available()?;
        self.feeds.remove(&owner);
        Ok(())
    }

    async fn remove_by_content(&self, owner: Uuid, content_id: Uuid) -> Result<bool> {
        self.check_available()?;
        Ok(match self.feeds.get_mut(&owner) {
            Some(mut feed) => {
                let before = feed.len();
                feed.retain(|e| e.content_id != content_id);
                feed.len() != before
            }
            None => false,
        })
    }

    async fn remove_by_author(&self, owner: Uuid, author_id: Uuid) -> Result<usize> {
        self.check_available()?;
        Ok(match self.feeds.get_mut(&owner) {
            Some(mut feed) => {
                let before = feed.len();
                feed.retain(|e| e.author_id != author_id);
                before - feed.len()
            }
            None => 0,
        })
    }
}
