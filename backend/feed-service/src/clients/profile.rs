use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{check_status, with_auth, IdList, ProfileClient};
use crate::error::{AppError, Result};
use crate::models::AuthToken;

const SERVICE: &str = "profile-service";

/// HTTP client for the profile service's follow graph endpoints.
///
/// Calls without a bearer token are not sent; they resolve to an empty list
/// so unauthenticated paths degrade to "no relationships".
#[derive(Clone)]
pub struct HttpProfileClient {
    client: Client,
    base_url: String,
}

impl HttpProfileClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_ids(
        &self,
        user_id: Uuid,
        relation: &str,
        limit: Option<usize>,
        auth: &AuthToken,
    ) -> Result<Vec<Uuid>> {
        if auth.as_str().is_none() {
            warn!(user_id = %user_id, relation, "No auth token for profile lookup, returning empty list");
            return Ok(Vec::new());
        }

        let url = format!("{}/api/v1/profiles/{}/{}", self.base_url, user_id, relation);
        let mut request = self.client.get(&url);
        if let Some(limit) = limit {
            request = request.query(&[("limit", limit)]);
        }

        let response = with_auth(request, auth).send().await?;
        let ids = check_status(SERVICE, response).await?.json::<IdList>().await?.ids;
        debug!(user_id = %user_id, relation, count = ids.len(), "Fetched profile relation");
        Ok(ids)
    }
}

#[async_trait]
impl ProfileClient for HttpProfileClient {
    async fn get_followers(&self, user_id: Uuid, auth: &AuthToken) -> Result<Vec<Uuid>> {
        self.fetch_ids(user_id, "followers", None, auth).await
    }

    async fn get_followings(
        &self,
        user_id: Uuid,
        limit: usize,
        auth: &AuthToken,
    ) -> Result<Vec<Uuid>> {
        self.fetch_ids(user_id, "followings", Some(limit), auth).await
    }

    async fn get_blocked(&self, user_id: Uuid, auth: &AuthToken) -> Result<Vec<Uuid>> {
        self.fetch_ids(user_id, "blocked", None, auth).await
    }
}
