use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub clients: ClientsConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub trending: TrendingConfig,
    #[serde(default)]
    pub follower_cache: FollowerCacheConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_kafka_brokers")]
    pub brokers: String,
    #[serde(default = "default_kafka_group_id")]
    pub group_id: String,
    #[serde(default = "default_kafka_topic_prefix")]
    pub topic_prefix: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            brokers: default_kafka_brokers(),
            group_id: default_kafka_group_id(),
            topic_prefix: default_kafka_topic_prefix(),
        }
    }
}

/// Outbound HTTP collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientsConfig {
    #[serde(default = "default_profile_service_url")]
    pub profile_service_url: String,
    #[serde(default = "default_content_service_url")]
    pub content_service_url: String,
    #[serde(default = "default_client_timeout_secs")]
    pub timeout_secs: u64,
    /// Bearer token used for calls made on behalf of consumed events,
    /// where no end-user token exists.
    #[serde(default)]
    pub service_token: Option<String>,
}

impl Default for ClientsConfig {
    fn default() -> Self {
        Self {
            profile_service_url: default_profile_service_url(),
            content_service_url: default_content_service_url(),
            timeout_secs: default_client_timeout_secs(),
            service_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    pub max_feed_size: usize,
    pub followings_max_count: usize,
    pub tweets_by_each_following_max_count: usize,
    pub all_followings_tweets_max_count: usize,
    pub trend_tweets_max_count: usize,
    pub trend_categories_max_count: usize,
    pub trend_tweets_in_category_max_count: usize,
    /// Items copied from a followee into a new follower's feed.
    pub bootstrap_count: usize,
    pub max_page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            max_feed_size: 500,
            followings_max_count: 100,
            tweets_by_each_following_max_count: 10,
            all_followings_tweets_max_count: 400,
            trend_tweets_max_count: 50,
            trend_categories_max_count: 5,
            trend_tweets_in_category_max_count: 10,
            bootstrap_count: 30,
            max_page_size: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub like_weight: f64,
    pub retweet_weight: f64,
    pub max_novelty_factor: f64,
    pub novelty_expiry_hours: f64,
    pub time_decay_factor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            like_weight: 1.0,
            retweet_weight: 2.0,
            max_novelty_factor: 100.0,
            novelty_expiry_hours: 24.0,
            time_decay_factor: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendSourceKind {
    /// Trends computed by this service from consumed events.
    Local,
    /// Trends served by the content service.
    Content,
}

impl FromStr for TrendSourceKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "content" => Ok(Self::Content),
            other => anyhow::bail!("unknown trend source: {}", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingConfig {
    pub window_hours: i64,
    pub snapshot_ttl_secs: u64,
    pub hashtag_cache_size: usize,
    pub tweet_cache_size: usize,
    pub source: TrendSourceKind,
}

impl Default for TrendingConfig {
    fn default() -> Self {
        Self {
            window_hours: 24,
            snapshot_ttl_secs: 30 * 60,
            hashtag_cache_size: 100,
            tweet_cache_size: 500,
            source: TrendSourceKind::Local,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowerCacheConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for FollowerCacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 10 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let feed_defaults = FeedConfig::default();
        let scoring_defaults = ScoringConfig::default();
        let trending_defaults = TrendingConfig::default();
        let follower_defaults = FollowerCacheConfig::default();

        Ok(Config {
            app: AppConfig {
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("APP_PORT", 8000)?,
            },
            redis: RedisConfig {
                url: std::env::var("REDIS_URL").context("REDIS_URL must be set")?,
            },
            kafka: KafkaConfig {
                enabled: env_or("KAFKA_ENABLED", false)?,
                brokers: std::env::var("KAFKA_BROKERS").unwrap_or_else(|_| default_kafka_brokers()),
                group_id: std::env::var("KAFKA_FEED_GROUP_ID")
                    .unwrap_or_else(|_| default_kafka_group_id()),
                topic_prefix: std::env::var("KAFKA_TOPIC_PREFIX")
                    .unwrap_or_else(|_| default_kafka_topic_prefix()),
            },
            clients: ClientsConfig {
                profile_service_url: std::env::var("PROFILE_SERVICE_URL")
                    .unwrap_or_else(|_| default_profile_service_url()),
                content_service_url: std::env::var("CONTENT_SERVICE_URL")
                    .unwrap_or_else(|_| default_content_service_url()),
                timeout_secs: env_or("CLIENT_TIMEOUT_SECS", default_client_timeout_secs())?,
                service_token: std::env::var("FEED_SERVICE_TOKEN")
                    .ok()
                    .filter(|t| !t.trim().is_empty()),
            },
            feed: FeedConfig {
                max_feed_size: env_or("FEED_MAX_SIZE", feed_defaults.max_feed_size)?,
                followings_max_count: env_or(
                    "FEED_FOLLOWINGS_MAX_COUNT",
                    feed_defaults.followings_max_count,
                )?,
                tweets_by_each_following_max_count: env_or(
                    "FEED_TWEETS_BY_EACH_FOLLOWING_MAX_COUNT",
                    feed_defaults.tweets_by_each_following_max_count,
                )?,
                all_followings_tweets_max_count: env_or(
                    "FEED_ALL_FOLLOWINGS_TWEETS_MAX_COUNT",
                    feed_defaults.all_followings_tweets_max_count,
                )?,
                trend_tweets_max_count: env_or(
                    "FEED_TREND_TWEETS_MAX_COUNT",
                    feed_defaults.trend_tweets_max_count,
                )?,
                trend_categories_max_count: env_or(
                    "FEED_TREND_CATEGORIES_MAX_COUNT",
                    feed_defaults.trend_categories_max_count,
                )?,
                trend_tweets_in_category_max_count: env_or(
                    "FEED_TREND_TWEETS_IN_CATEGORY_MAX_COUNT",
                    feed_defaults.trend_tweets_in_category_max_count,
                )?,
                bootstrap_count: env_or("FEED_BOOTSTRAP_COUNT", feed_defaults.bootstrap_count)?,
                max_page_size: env_or("FEED_MAX_PAGE_SIZE", feed_defaults.max_page_size)?,
            },
            scoring: ScoringConfig {
                like_weight: env_or("SCORE_LIKE_WEIGHT", scoring_defaults.like_weight)?,
                retweet_weight: env_or("SCORE_RETWEET_WEIGHT", scoring_defaults.retweet_weight)?,
                max_novelty_factor: env_or(
                    "SCORE_MAX_NOVELTY_FACTOR",
                    scoring_defaults.max_novelty_factor,
                )?,
                novelty_expiry_hours: env_or(
                    "SCORE_NOVELTY_EXPIRY_HOURS",
                    scoring_defaults.novelty_expiry_hours,
                )?,
                time_decay_factor: env_or(
                    "SCORE_TIME_DECAY_FACTOR",
                    scoring_defaults.time_decay_factor,
                )?,
            },
            trending: TrendingConfig {
                window_hours: env_or("TREND_WINDOW_HOURS", trending_defaults.window_hours)?,
                snapshot_ttl_secs: env_or(
                    "TREND_SNAPSHOT_TTL_SECS",
                    trending_defaults.snapshot_ttl_secs,
                )?,
                hashtag_cache_size: env_or(
                    "TREND_HASHTAG_CACHE_SIZE",
                    trending_defaults.hashtag_cache_size,
                )?,
                tweet_cache_size: env_or(
                    "TREND_TWEET_CACHE_SIZE",
                    trending_defaults.tweet_cache_size,
                )?,
                source: env_or("TREND_SOURCE", trending_defaults.source)?,
            },
            follower_cache: FollowerCacheConfig {
                ttl_secs: env_or("FOLLOWER_CACHE_TTL_SECS", follower_defaults.ttl_secs)?,
                sweep_interval_secs: env_or(
                    "FOLLOWER_CACHE_SWEEP_INTERVAL_SECS",
                    follower_defaults.sweep_interval_secs,
                )?,
            },
        })
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

fn default_kafka_brokers() -> String {
    "localhost:9092".to_string()
}

fn default_kafka_group_id() -> String {
    "nova-feed-service".to_string()
}

fn default_kafka_topic_prefix() -> String {
    "nova".to_string()
}

fn default_profile_service_url() -> String {
    "http://profile-service:8080".to_string()
}

fn default_content_service_url() -> String {
    "http://content-service:8080".to_string()
}

fn default_client_timeout_secs() -> u64 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "REDIS_URL",
            "APP_PORT",
            "FEED_MAX_SIZE",
            "TREND_SOURCE",
            "FEED_SERVICE_TOKEN",
            "SCORE_LIKE_WEIGHT",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn from_env_applies_defaults() {
        clear_env();
        std::env::set_var("REDIS_URL", "redis://127.0.0.1:6379");

        let config = Config::from_env().unwrap();
        assert_eq!(config.app.port, 8000);
        assert_eq!(config.feed.bootstrap_count, 30);
        assert_eq!(config.feed.max_page_size, 100);
        assert_eq!(config.trending.window_hours, 24);
        assert_eq!(config.trending.source, TrendSourceKind::Local);
        assert_eq!(config.follower_cache.ttl_secs, 600);
        assert!(config.clients.service_token.is_none());

        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        clear_env();
        std::env::set_var("REDIS_URL", "redis://cache:6379");
        std::env::set_var("FEED_MAX_SIZE", "2");
        std::env::set_var("TREND_SOURCE", "content");
        std::env::set_var("FEED_SERVICE_TOKEN", "svc-token");
        std::env::set_var("SCORE_LIKE_WEIGHT", "1.5");

        let config = Config::from_env().unwrap();
        assert_eq!(config.feed.max_feed_size, 2);
        assert_eq!(config.trending.source, TrendSourceKind::Content);
        assert_eq!(config.clients.service_token.as_deref(), Some("svc-token"));
        assert_eq!(config.scoring.like_weight, 1.5);

        clear_env();
    }

    #[test]
    #[serial]
    fn from_env_requires_redis_url() {
        clear_env();
        assert!(Config::from_env().is_err());
    }

    #[test]
    #[serial]
    fn from_env_rejects_malformed_numbers() {
        clear_env();
        std::env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
        std::env::set_var("APP_PORT", "eighty");

        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));

        clear_env();
    }
}
