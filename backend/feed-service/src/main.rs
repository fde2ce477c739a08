use actix_web::{dev::Service, web, App, HttpResponse, HttpServer};
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_service::clients::{
    ContentClient, HttpContentClient, HttpProfileClient, ProfileClient, TrendSource,
};
use feed_service::config::{Config, TrendSourceKind};
use feed_service::consumers::{LifecycleEventConsumer, LifecycleEventConsumerConfig};
use feed_service::handlers::{self, FeedHandlerState, TrendingHandlerState};
use feed_service::models::AuthToken;
use feed_service::services::{
    FanOutProcessor, FeedBuilder, FeedContext, FeedQueryService, FollowerSnapshotCache,
    OwnerLocks, RankedFeedStore, RedisFeedStore, ScoreEngine, TrendAggregator,
};
use feed_service::services::trending::{RedisTrendStore, TrendStore};
use feed_service::utils::clock::{SharedClock, SystemClock};

async fn readiness(store: web::Data<RedisFeedStore>) -> HttpResponse {
    match store.ping().await {
        Ok(()) => HttpResponse::Ok().body("OK"),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            HttpResponse::ServiceUnavailable().body("redis unavailable")
        }
    }
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true),
        )
        .init();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("Configuration loading failed: {:#}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting feed-service v{}", env!("CARGO_PKG_VERSION"));
    info!("Environment: {}", config.app.env);

    let feed_store = match RedisFeedStore::connect(&config.redis.url, config.feed.max_feed_size).await
    {
        Ok(store) => store,
        Err(e) => {
            error!("Redis connection failed: {}", e);
            eprintln!("ERROR: Failed to connect to Redis: {}", e);
            std::process::exit(1);
        }
    };
    let trend_store: Arc<dyn TrendStore> =
        Arc::new(RedisTrendStore::new(feed_store.connection_manager()));
    let readiness_store = web::Data::new(feed_store.clone());
    let feed_store: Arc<dyn RankedFeedStore> = Arc::new(feed_store);

    let timeout = Duration::from_secs(config.clients.timeout_secs);
    let service_token = config
        .clients
        .service_token
        .clone()
        .map(AuthToken::bearer)
        .unwrap_or_else(AuthToken::none);
    if service_token.as_str().is_none() {
        warn!("FEED_SERVICE_TOKEN not set; event-driven follower lookups will come back empty");
    }

    let profiles: Arc<dyn ProfileClient> =
        match HttpProfileClient::new(&config.clients.profile_service_url, timeout) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("Failed to build profile client: {}", e);
                std::process::exit(1);
            }
        };
    let content_client = match HttpContentClient::new(
        &config.clients.content_service_url,
        timeout,
        service_token.clone(),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build content client: {}", e);
            std::process::exit(1);
        }
    };
    let content: Arc<dyn ContentClient> = content_client.clone();

    let clock: SharedClock = Arc::new(SystemClock);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let followers = Arc::new(FollowerSnapshotCache::new(
        profiles,
        clock.clone(),
        Duration::from_secs(config.follower_cache.ttl_secs),
    ));
    let sweeper = followers.clone().spawn_sweeper(
        Duration::from_secs(config.follower_cache.sweep_interval_secs.max(1)),
        shutdown_rx.clone(),
    );

    let trends = Arc::new(TrendAggregator::new(
        trend_store,
        clock.clone(),
        config.trending.clone(),
    ));
    let trend_source: Arc<dyn TrendSource> = match config.trending.source {
        TrendSourceKind::Local => trends.clone(),
        TrendSourceKind::Content => content_client.clone(),
    };
    info!(source = ?config.trending.source, "Trend source selected");

    let ctx = FeedContext {
        store: feed_store.clone(),
        followers,
        content: content.clone(),
        scorer: ScoreEngine::new(config.scoring.clone()),
        locks: Arc::new(OwnerLocks::new()),
        clock,
    };

    let builder = Arc::new(FeedBuilder::new(
        ctx.clone(),
        trend_source,
        config.feed.clone(),
    ));
    let query = Arc::new(FeedQueryService::new(
        feed_store,
        builder,
        content,
        config.feed.max_page_size,
    ));

    let consumer_handle = if config.kafka.enabled {
        let processor = Arc::new(FanOutProcessor::new(
            ctx,
            trends.clone(),
            config.feed.bootstrap_count,
            service_token,
        ));
        match LifecycleEventConsumer::new(
            LifecycleEventConsumerConfig::from(&config.kafka),
            processor,
            shutdown_rx.clone(),
        ) {
            Ok(consumer) => Some(tokio::spawn(consumer.run())),
            Err(e) => {
                error!("Failed to start lifecycle event consumer: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        warn!("Kafka disabled; feeds are only maintained by on-demand rebuilds");
        None
    };

    let feed_state = web::Data::new(FeedHandlerState { query });
    let trending_state = web::Data::new(TrendingHandlerState { trends });

    let bind_addr = format!("{}:{}", config.app.host, config.app.port);
    info!("HTTP server listening on {}", bind_addr);

    let result = HttpServer::new(move || {
        App::new()
            .app_data(feed_state.clone())
            .app_data(trending_state.clone())
            .app_data(readiness_store.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/api/v1/health/live", web::get().to(|| async { "OK" }))
            .route("/api/v1/health/ready", web::get().to(readiness))
            .route(
                "/metrics",
                web::get().to(feed_service::metrics::serve_metrics),
            )
            .wrap_fn(|req, srv| {
                let method = req.method().to_string();
                let path = req
                    .match_pattern()
                    .unwrap_or_else(|| req.path().to_string());
                let start = Instant::now();

                let fut = srv.call(req);
                async move {
                    match fut.await {
                        Ok(res) => {
                            feed_service::metrics::observe_http_request(
                                &method,
                                &path,
                                res.status().as_u16(),
                                start.elapsed(),
                            );
                            Ok(res)
                        }
                        Err(err) => {
                            feed_service::metrics::observe_http_request(
                                &method,
                                &path,
                                500,
                                start.elapsed(),
                            );
                            Err(err)
                        }
                    }
                }
            })
            .configure(handlers::configure)
    })
    .bind(bind_addr)?
    .run()
    .await;

    info!("HTTP server stopped, shutting down background tasks");
    let _ = shutdown_tx.send(true);
    if let Some(handle) = consumer_handle {
        if let Err(e) = handle.await {
            error!("Lifecycle consumer task failed: {}", e);
        }
    }
    if let Err(e) = sweeper.await {
        error!("Follower cache sweeper task failed: {}", e);
    }

    result
}
