use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::{check_status, with_auth, ContentClient, IdList, TrendSource};
use crate::error::{AppError, Result};
use crate::models::{AuthToken, ContentSummary};

const SERVICE: &str = "content-service";

#[derive(Serialize)]
struct BatchRequest<'a> {
    ids: &'a [Uuid],
}

/// HTTP client for the content service. Also serves as the trend source when
/// trends are computed upstream rather than by this service.
#[derive(Clone)]
pub struct HttpContentClient {
    client: Client,
    base_url: String,
    service_token: AuthToken,
}

impl HttpContentClient {
    pub fn new(base_url: &str, timeout: Duration, service_token: AuthToken) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_token,
        })
    }

    async fn get_ids(&self, path: &str, count: usize) -> Result<Vec<Uuid>> {
        let url = format!("{}{}", self.base_url, path);
        let request = self.client.get(&url).query(&[("count", count)]);
        let response = with_auth(request, &self.service_token).send().await?;
        Ok(check_status(SERVICE, response).await?.json::<IdList>().await?.ids)
    }
}

#[async_trait]
impl ContentClient for HttpContentClient {
    async fn get_by_ids(&self, ids: &[Uuid], auth: &AuthToken) -> Result<Vec<ContentSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/api/v1/tweets/batch", self.base_url);
        let request = self.client.post(&url).json(&BatchRequest { ids });
        let response = with_auth(request, auth).send().await?;
        let items = check_status(SERVICE, response)
            .await?
            .json::<Vec<ContentSummary>>()
            .await?;
        debug!(requested = ids.len(), resolved = items.len(), "Resolved content batch");
        Ok(items)
    }

    async fn get_recent_by_author(
        &self,
        author_id: Uuid,
        count: usize,
        auth: &AuthToken,
    ) -> Result<Vec<ContentSummary>> {
        let url = format!("{}/api/v1/tweets/user/{}", self.base_url, author_id);
        let request = self.client.get(&url).query(&[("count", count)]);
        let response = with_auth(request, auth).send().await?;
        Ok(check_status(SERVICE, response)
            .await?
            .json::<Vec<ContentSummary>>()
            .await?)
    }
}

#[async_trait]
impl TrendSource for HttpContentClient {
    async fn trend_categories(&self, count: usize) -> Result<Vec<String>> {
        let url = format!("{}/api/v1/trends/hashtags", self.base_url);
        let request = self.client.get(&url).query(&[("count", count)]);
        let response = with_auth(request, &self.service_token).send().await?;
        Ok(check_status(SERVICE, response)
            .await?
            .json::<Vec<String>>()
            .await?)
    }

    async fn trend_tweet_ids(&self, count: usize) -> Result<Vec<Uuid>> {
        self.get_ids("/api/v1/trends/tweets", count).await
    }

    async fn trend_tweet_ids_by_hashtag(&self, tag: &str, count: usize) -> Result<Vec<Uuid>> {
        let path = format!("/api/v1/trends/hashtags/{}/tweets", urlencoding::encode(tag));
        self.get_ids(&path, count).await
    }
}
