//! Prometheus metrics for feed-service.
//!
//! Exposes feed-specific collectors and an HTTP handler for the `/metrics` endpoint.

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};
use std::time::Duration;

pub mod feed;

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_service_http_requests_total",
        "Total HTTP requests handled by feed-service",
        &["method", "path", "status"]
    )
    .expect("Failed to register feed_service_http_requests_total")
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "feed_service_http_request_duration_seconds",
        "HTTP request latency for feed-service",
        &["method", "path", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register feed_service_http_request_duration_seconds")
});

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

/// Actix handler that renders Prometheus metrics in text format.
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
