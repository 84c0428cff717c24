//! Prometheus Metrics Definitions
//!
//! Defines the relief metrics with their labels.
//! Exposes a /metrics endpoint for Prometheus scraping.

use axum::{http::StatusCode, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram_vec, CounterVec, Encoder, Gauge,
    HistogramVec, TextEncoder,
};

use crate::error::{ApiError, ApiResult};

/// HTTP request latency buckets (seconds)
const HTTP_LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance - initialized once at startup
pub static METRICS: Lazy<ApiResult<ReliefMetrics>> = Lazy::new(ReliefMetrics::new);

/// The registered metrics, or `None` if registration failed. Recording
/// through `None` is a no-op.
pub fn metrics() -> Option<&'static ReliefMetrics> {
    METRICS.as_ref().ok()
}

fn registration_error(name: &str, e: prometheus::Error) -> ApiError {
    ApiError::internal_error(format!("Failed to register {}: {}", name, e))
}

/// Container for all relief metrics.
#[derive(Clone)]
pub struct ReliefMetrics {
    /// HTTP request counter - labels: method, path, status
    pub http_requests_total: CounterVec,

    /// HTTP request duration histogram - labels: method, path
    pub http_request_duration_seconds: HistogramVec,

    /// Cache lookups - labels: namespace, result (hit/miss)
    pub cache_lookups_total: CounterVec,

    /// Failed cache writes - labels: namespace
    pub cache_write_failures_total: CounterVec,

    /// Upstream provider calls - labels: provider, outcome (ok/empty/error)
    pub upstream_calls_total: CounterVec,

    /// Events handed to the event channel - labels: event, audience
    pub events_published_total: CounterVec,

    /// Events dropped because an observer queue was full or closed
    pub events_dropped_total: CounterVec,

    /// Current connected observers
    pub websocket_connections: Gauge,
}

impl ReliefMetrics {
    /// Create and register all metrics with Prometheus.
    pub fn new() -> ApiResult<Self> {
        Ok(Self {
            http_requests_total: register_counter_vec!(
                "relief_http_requests_total",
                "Total number of HTTP requests",
                &["method", "path", "status"]
            )
            .map_err(|e| registration_error("http_requests_total", e))?,

            http_request_duration_seconds: register_histogram_vec!(
                "relief_http_request_duration_seconds",
                "HTTP request duration in seconds",
                &["method", "path"],
                HTTP_LATENCY_BUCKETS.to_vec()
            )
            .map_err(|e| registration_error("http_request_duration_seconds", e))?,

            cache_lookups_total: register_counter_vec!(
                "relief_cache_lookups_total",
                "Cache lookups by namespace and result",
                &["namespace", "result"]
            )
            .map_err(|e| registration_error("cache_lookups_total", e))?,

            cache_write_failures_total: register_counter_vec!(
                "relief_cache_write_failures_total",
                "Cache writes that failed",
                &["namespace"]
            )
            .map_err(|e| registration_error("cache_write_failures_total", e))?,

            upstream_calls_total: register_counter_vec!(
                "relief_upstream_calls_total",
                "Calls to upstream providers",
                &["provider", "outcome"]
            )
            .map_err(|e| registration_error("upstream_calls_total", e))?,

            events_published_total: register_counter_vec!(
                "relief_events_published_total",
                "Events published to observers",
                &["event", "audience"]
            )
            .map_err(|e| registration_error("events_published_total", e))?,

            events_dropped_total: register_counter_vec!(
                "relief_events_dropped_total",
                "Per-observer deliveries dropped",
                &["reason"]
            )
            .map_err(|e| registration_error("events_dropped_total", e))?,

            websocket_connections: register_gauge!(
                "relief_websocket_connections",
                "Current number of connected observers"
            )
            .map_err(|e| registration_error("websocket_connections", e))?,
        })
    }

    /// Record an HTTP request.
    pub fn record_http_request(&self, method: &str, path: &str, status: u16, duration_secs: f64) {
        let status_str = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, path, &status_str])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(duration_secs);
    }

    pub fn record_cache_lookup(&self, namespace: &str, hit: bool) {
        let result = if hit { "hit" } else { "miss" };
        self.cache_lookups_total
            .with_label_values(&[namespace, result])
            .inc();
    }

    pub fn record_cache_write_failure(&self, namespace: &str) {
        self.cache_write_failures_total
            .with_label_values(&[namespace])
            .inc();
    }

    pub fn record_upstream_call(&self, provider: &str, outcome: &str) {
        self.upstream_calls_total
            .with_label_values(&[provider, outcome])
            .inc();
    }

    pub fn record_event(&self, event: &str, audience: &str) {
        self.events_published_total
            .with_label_values(&[event, audience])
            .inc();
    }

    pub fn record_dropped(&self, reason: &str, count: usize) {
        self.events_dropped_total
            .with_label_values(&[reason])
            .inc_by(count as f64);
    }

    /// Increment WebSocket connection count.
    pub fn ws_connected(&self) {
        self.websocket_connections.inc();
    }

    /// Decrement WebSocket connection count.
    pub fn ws_disconnected(&self) {
        self.websocket_connections.dec();
    }
}

/// Handler for GET /metrics endpoint.
///
/// Returns Prometheus text format metrics.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Observability",
    responses(
        (
            status = 200,
            description = "Prometheus metrics in text format",
            content_type = "text/plain"
        ),
        (status = 500, description = "Failed to encode metrics"),
    ),
)]
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {}", e).into_bytes(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::core::Collector;

    #[test]
    fn test_metrics_creation() -> Result<(), String> {
        let metrics = METRICS
            .as_ref()
            .map_err(|e| format!("Metrics init failed: {}", e.message))?;
        assert!(!metrics.http_requests_total.desc().is_empty());
        Ok(())
    }

    #[test]
    fn test_record_cache_and_upstream() -> Result<(), String> {
        let metrics = metrics().ok_or("Metrics init failed")?;
        let before = metrics
            .cache_lookups_total
            .with_label_values(&["geocode", "hit"])
            .get();
        metrics.record_cache_lookup("geocode", true);
        metrics.record_upstream_call("gemini", "error");
        let after = metrics
            .cache_lookups_total
            .with_label_values(&["geocode", "hit"])
            .get();
        assert!(after >= before + 1.0);
        Ok(())
    }

    #[test]
    fn test_websocket_metrics() -> Result<(), String> {
        let metrics = metrics().ok_or("Metrics init failed")?;
        metrics.ws_connected();
        metrics.ws_disconnected();
        metrics.record_event("system_status", "ALL");
        metrics.record_dropped("full", 2);
        Ok(())
    }
}
