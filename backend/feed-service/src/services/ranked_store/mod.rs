//! Per-user capped, score-ordered feed storage.
//!
//! Every owner has one collection ordered by descending score (ties broken by
//! descending content id) and never longer than the configured maximum.
//! Content ids are unique within a collection: re-inserting an id keeps the
//! higher of the two scores.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::FeedEntry;

pub mod memory;
pub mod redis_store;

pub use self::memory::InMemoryFeedStore;
pub use self::redis_store::RedisFeedStore;

#[async_trait]
pub trait RankedFeedStore: Send + Sync {
    async fn insert(&self, owner: Uuid, entry: FeedEntry) -> Result<()> {
        self.insert_batch(owner, std::slice::from_ref(&entry)).await
    }

    /// Upsert all entries, then trim the collection to capacity.
    async fn insert_batch(&self, owner: Uuid, entries: &[FeedEntry]) -> Result<()>;

    /// Atomically swap the owner's collection for `entries` (trimmed to capacity).
    async fn replace(&self, owner: Uuid, entries: &[FeedEntry]) -> Result<()>;

    /// Descending-score range read. Out-of-range reads return fewer or no items.
    async fn page(&self, owner: Uuid, start: usize, count: usize) -> Result<Vec<FeedEntry>>;

    async fn len(&self, owner: Uuid) -> Result<usize>;

    async fn clear(&self, owner: Uuid) -> Result<()>;

    async fn remove_by_content(&self, owner: Uuid, content_id: Uuid) -> Result<bool>;

    /// Remove every entry authored by `author_id`, returning how many were dropped.
    async fn remove_by_author(&self, owner: Uuid, author_id: Uuid) -> Result<usize>;
}
