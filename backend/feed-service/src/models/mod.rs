use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod events;

pub use events::FeedEvent;

/// One ranked slot in an owner's feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedEntry {
    pub content_id: Uuid,
    pub author_id: Uuid,
    pub score: f64,
}

impl FeedEntry {
    pub fn new(content_id: Uuid, author_id: Uuid, score: f64) -> Self {
        Self {
            content_id,
            author_id,
            score,
        }
    }
}

/// Content as returned by the content service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub id: Uuid,
    pub author_id: Uuid,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub retweets: u64,
}

/// Paginated feed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedPage {
    pub items: Vec<ContentSummary>,
    pub total_count: usize,
    pub has_more: bool,
    pub next_cursor: usize,
    /// Set when the feed was empty and had to be rebuilt; the page then
    /// starts at offset 0 regardless of the requested cursor.
    pub rebuilt: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSizeResponse {
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPage<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub page_size: usize,
}

/// Bearer token forwarded to downstream services. `None` means the call has
/// no credentials and the profile client answers with empty results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthToken(pub Option<String>);

impl AuthToken {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn none() -> Self {
        Self(None)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.0.as_deref()
    }
}
