//! Outbound collaborators: the profile service (follow graph) and the
//! content service (tweet bodies, per-author timelines, global trends).

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{AuthToken, ContentSummary};

pub mod content;
pub mod profile;

pub use content::HttpContentClient;
pub use profile::HttpProfileClient;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileClient: Send + Sync {
    async fn get_followers(&self, user_id: Uuid, auth: &AuthToken) -> Result<Vec<Uuid>>;

    async fn get_followings(
        &self,
        user_id: Uuid,
        limit: usize,
        auth: &AuthToken,
    ) -> Result<Vec<Uuid>>;

    async fn get_blocked(&self, user_id: Uuid, auth: &AuthToken) -> Result<Vec<Uuid>>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentClient: Send + Sync {
    /// Resolve summaries for `ids`. Unknown ids are omitted and the order of
    /// the response is not guaranteed.
    async fn get_by_ids(&self, ids: &[Uuid], auth: &AuthToken) -> Result<Vec<ContentSummary>>;

    /// Most recent content by `author_id`, newest first.
    async fn get_recent_by_author(
        &self,
        author_id: Uuid,
        count: usize,
        auth: &AuthToken,
    ) -> Result<Vec<ContentSummary>>;
}

/// Where the feed builder pulls trending filler from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrendSource: Send + Sync {
    async fn trend_categories(&self, count: usize) -> Result<Vec<String>>;

    async fn trend_tweet_ids(&self, count: usize) -> Result<Vec<Uuid>>;

    async fn trend_tweet_ids_by_hashtag(&self, tag: &str, count: usize) -> Result<Vec<Uuid>>;
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct IdList {
    pub ids: Vec<Uuid>,
}

pub(crate) fn with_auth(request: RequestBuilder, auth: &AuthToken) -> RequestBuilder {
    match auth.as_str() {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

/// Turn a non-2xx response into `UpstreamUnavailable`.
pub(crate) async fn check_status(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(AppError::UpstreamUnavailable(format!(
        "{} responded {}: {}",
        service, status, body
    )))
}
