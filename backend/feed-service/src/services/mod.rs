//! Service layer for feed-service
//!
//! - scoring: rank score from age and engagement
//! - ranked_store: capped per-user feeds (Redis / in-memory)
//! - follower_cache: short-TTL follower snapshots
//! - fanout: push path driven by lifecycle events
//! - feed_builder: pull path rebuilding a feed from followings and trends
//! - feed_query: read path used by the HTTP handlers
//! - trending: windowed hashtag / like aggregation

use std::sync::Arc;

use crate::clients::ContentClient;
use crate::utils::clock::SharedClock;

pub mod fanout;
pub mod feed_builder;
pub mod feed_query;
pub mod follower_cache;
pub mod owner_lock;
pub mod ranked_store;
pub mod scoring;
pub mod trending;

pub use fanout::FanOutProcessor;
pub use feed_builder::FeedBuilder;
pub use feed_query::FeedQueryService;
pub use follower_cache::FollowerSnapshotCache;
pub use owner_lock::OwnerLocks;
pub use ranked_store::{InMemoryFeedStore, RankedFeedStore, RedisFeedStore};
pub use scoring::ScoreEngine;
pub use trending::TrendAggregator;

/// Collaborators shared by the push and pull paths.
#[derive(Clone)]
pub struct FeedContext {
    pub store: Arc<dyn RankedFeedStore>,
    pub followers: Arc<FollowerSnapshotCache>,
    pub content: Arc<dyn ContentClient>,
    pub scorer: ScoreEngine,
    pub locks: Arc<OwnerLocks>,
    pub clock: SharedClock,
}
