//! Enrichment metrics collection.

use metrics::{counter, gauge, histogram};

use crate::circuit_breaker::CircuitState;

/// Metric name constants for consistency.
pub mod names {
    /// Enrichment requests by outcome.
    pub const REQUESTS_TOTAL: &str = "lens_enrichment_requests_total";

    /// Enrichment request latency in seconds.
    pub const LATENCY_SECONDS: &str = "lens_enrichment_latency_seconds";

    /// Breaker state: 0 closed, 1 half-open, 2 open.
    pub const CIRCUIT_STATE: &str = "lens_enrichment_circuit_state";
}

/// Record a finished enrichment request.
pub fn record_request(outcome: &'static str, seconds: f64) {
    counter!(names::REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::LATENCY_SECONDS, "outcome" => outcome).record(seconds);
}

/// Record a request rejected by the open breaker.
pub fn record_rejected() {
    counter!(names::REQUESTS_TOTAL, "outcome" => "circuit_open").increment(1);
}

pub fn record_breaker_state(breaker: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!(names::CIRCUIT_STATE, "breaker" => breaker.to_string()).set(value);
}
