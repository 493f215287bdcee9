//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "lens_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "lens_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "lens_http_requests_in_flight";

    // SSE metrics
    pub const SSE_CONNECTIONS_TOTAL: &str = "lens_sse_connections_total";
    pub const SSE_CONNECTIONS_ACTIVE: &str = "lens_sse_connections_active";
    pub const SSE_EVENTS_SENT: &str = "lens_sse_events_sent_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", path.to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a new SSE subscriber.
pub fn record_sse_connected() {
    counter!(names::SSE_CONNECTIONS_TOTAL).increment(1);
    gauge!(names::SSE_CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn record_sse_disconnected() {
    gauge!(names::SSE_CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn record_sse_event() {
    counter!(names::SSE_EVENTS_SENT).increment(1);
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    // Route template keeps label cardinality bounded
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::HTTP_REQUESTS_TOTAL.ends_with("_total"));
        assert!(names::SSE_CONNECTIONS_ACTIVE.starts_with("lens_"));
    }
}
