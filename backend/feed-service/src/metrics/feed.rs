//! Feed pipeline metrics: fan-out, rebuilds, reads, trend and follower caches.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};
use std::time::Duration;

static FANOUT_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_events_total",
        "Lifecycle events handled by the fan-out processor",
        &["kind", "status"]
    )
    .expect("Failed to register feed fanout events metric")
});

static FANOUT_DELIVERIES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "feed_fanout_deliveries_total",
        "Feed entries written into follower feeds by fan-out"
    )
    .expect("Failed to register feed fanout deliveries metric")
});

static FANOUT_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_fanout_failures_total",
        "Fan-out writes or lookups that failed and were skipped",
        &["stage"]
    )
    .expect("Failed to register feed fanout failures metric")
});

static FEED_READS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_reads_total",
        "Feed page reads by outcome (hit/rebuilt/empty)",
        &["outcome"]
    )
    .expect("Failed to register feed reads metric")
});

static FEED_REBUILD_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_rebuild_duration_seconds",
        "Duration of pull-based feed rebuilds",
        &["status"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to register feed rebuild duration metric")
});

static TREND_SNAPSHOT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_trend_snapshot_total",
        "Trend snapshot lookups (hit/miss/corrupt) per trend kind",
        &["kind", "result"]
    )
    .expect("Failed to register trend snapshot metric")
});

static FOLLOWER_CACHE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_follower_cache_total",
        "Follower snapshot cache lookups and evictions",
        &["result"]
    )
    .expect("Failed to register follower cache metric")
});

pub fn record_fanout_event(kind: &str, status: &str) {
    FANOUT_EVENTS_TOTAL.with_label_values(&[kind, status]).inc();
}

pub fn record_fanout_deliveries(count: usize) {
    FANOUT_DELIVERIES_TOTAL.inc_by(count as u64);
}

/// Stage is one of `followers`, `content_lookup`, `insert`, `remove`.
pub fn record_fanout_failure(stage: &str) {
    FANOUT_FAILURES_TOTAL.with_label_values(&[stage]).inc();
}

pub fn record_feed_read(outcome: &str) {
    FEED_READS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_rebuild(status: &str, duration: Duration) {
    FEED_REBUILD_DURATION_SECONDS
        .with_label_values(&[status])
        .observe(duration.as_secs_f64());
}

pub fn record_trend_snapshot(kind: &str, result: &str) {
    TREND_SNAPSHOT_TOTAL.with_label_values(&[kind, result]).inc();
}

pub fn record_follower_cache(result: &str) {
    FOLLOWER_CACHE_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_follower_cache_evictions(count: usize) {
    FOLLOWER_CACHE_TOTAL
        .with_label_values(&["evicted"])
        .inc_by(count as u64);
}
