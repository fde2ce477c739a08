//! Trending hashtags and tweets
//!
//! Usage and like events are appended to time-ordered logs; rankings are
//! computed over a trailing window and cached as short-lived snapshots.
pub mod aggregator;
pub mod store;

pub use aggregator::{TrendAggregator, TrendSnapshot};
pub use store::{InMemoryTrendStore, RedisTrendStore, TrendKind, TrendLog, TrendStore};
