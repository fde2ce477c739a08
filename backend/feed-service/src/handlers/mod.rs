use actix_web::web;

pub mod feed;
pub mod trending;

pub use feed::{
    get_feed, get_feed_size, rebuild_feed, remove_from_feed, remove_user_tweets_from_feed,
    FeedHandlerState,
};
pub use trending::{get_trending_hashtags, get_trending_tweets, TrendingHandlerState};

/// Register the feed and trend routes. Shared by the server and the API tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/feed")
            .service(get_feed)
            .service(get_feed_size)
            .service(rebuild_feed)
            .service(remove_user_tweets_from_feed)
            .service(remove_from_feed),
    )
    .service(
        web::scope("/api/v1/trends")
            .service(get_trending_hashtags)
            .service(get_trending_tweets),
    );
}
