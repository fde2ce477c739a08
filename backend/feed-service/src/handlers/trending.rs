//! Trending API Handlers
//!
//! Public endpoints serving the windowed hashtag and tweet rankings

use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Result;
use crate::models::TrendPage;
use crate::services::TrendAggregator;

const MAX_TREND_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendQuery {
    /// 1-based page (default: 1)
    #[serde(default = "default_page")]
    pub page: usize,
    /// Page size (default: 10, max: 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    10
}

pub struct TrendingHandlerState {
    pub trends: Arc<TrendAggregator>,
}

#[get("/hashtags")]
pub async fn get_trending_hashtags(
    query: web::Query<TrendQuery>,
    state: web::Data<TrendingHandlerState>,
) -> Result<HttpResponse> {
    let page_size = query.page_size.min(MAX_TREND_PAGE_SIZE);
    let items = state.trends.top_hashtags(query.page, page_size).await?;
    Ok(HttpResponse::Ok().json(TrendPage {
        items,
        page: query.page,
        page_size,
    }))
}

#[get("/tweets")]
pub async fn get_trending_tweets(
    query: web::Query<TrendQuery>,
    state: web::Data<TrendingHandlerState>,
) -> Result<HttpResponse> {
    let page_size = query.page_size.min(MAX_TREND_PAGE_SIZE);
    let items = state.trends.top_tweet_ids(query.page, page_size).await?;
    Ok(HttpResponse::Ok().json(TrendPage {
        items,
        page: query.page,
        page_size,
    }))
}
