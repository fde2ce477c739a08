use actix_web::{delete, get, put, web, HttpResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::middleware::AuthContext;
use crate::models::FeedSizeResponse;
use crate::services::FeedQueryService;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQueryParams {
    #[serde(default)]
    pub cursor: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page_size() -> i64 {
    20
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RemovedResponse {
    removed: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RebuildResponse {
    size: usize,
}

pub struct FeedHandlerState {
    pub query: Arc<FeedQueryService>,
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| AppError::Validation(format!("Invalid {}", what)))
}

#[get("")]
pub async fn get_feed(
    auth: AuthContext,
    query: web::Query<FeedQueryParams>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    debug!(
        user_id = %auth.user_id,
        cursor = query.cursor,
        page_size = query.page_size,
        "Getting feed"
    );
    let page = state
        .query
        .get_feed(auth.user_id, query.cursor, query.page_size, &auth.token)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

#[get("/size")]
pub async fn get_feed_size(
    auth: AuthContext,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let size = state.query.get_feed_size(auth.user_id).await?;
    Ok(HttpResponse::Ok().json(FeedSizeResponse { size }))
}

#[put("")]
pub async fn rebuild_feed(
    auth: AuthContext,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let size = state.query.rebuild_feed(auth.user_id, &auth.token).await?;
    Ok(HttpResponse::Ok().json(RebuildResponse { size }))
}

#[delete("/deleteUser/{user_id}")]
pub async fn remove_user_tweets_from_feed(
    auth: AuthContext,
    path: web::Path<String>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let author_id = parse_id(&path, "user id")?;
    let removed = state
        .query
        .remove_user_tweets_from_feed(auth.user_id, author_id)
        .await?;
    Ok(HttpResponse::Ok().json(RemovedResponse { removed }))
}

#[delete("/{content_id}")]
pub async fn remove_from_feed(
    auth: AuthContext,
    path: web::Path<String>,
    state: web::Data<FeedHandlerState>,
) -> Result<HttpResponse> {
    let content_id = parse_id(&path, "content id")?;
    let removed = state.query.remove_from_feed(auth.user_id, content_id).await?;
    Ok(HttpResponse::Ok().json(RemovedResponse {
        removed: usize::from(removed),
    }))
}
