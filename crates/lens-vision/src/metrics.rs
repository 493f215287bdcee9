//! Vision metrics collection.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Inference latency in seconds by model variant.
    pub const INFERENCE_DURATION_SECONDS: &str = "lens_inference_duration_seconds";

    /// Failed inferences by model variant.
    pub const INFERENCE_FAILURES_TOTAL: &str = "lens_inference_failures_total";

    /// Detections emitted after NMS by model variant.
    pub const DETECTIONS_TOTAL: &str = "lens_detections_total";
}

/// Record a completed inference.
pub fn record_inference(variant: &str, seconds: f64, detections: usize) {
    histogram!(names::INFERENCE_DURATION_SECONDS, "variant" => variant.to_string()).record(seconds);
    counter!(names::DETECTIONS_TOTAL, "variant" => variant.to_string())
        .increment(detections as u64);
}

/// Record a failed inference.
pub fn record_inference_failure(variant: &str) {
    counter!(names::INFERENCE_FAILURES_TOTAL, "variant" => variant.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::INFERENCE_DURATION_SECONDS.ends_with("_seconds"));
        assert!(names::INFERENCE_FAILURES_TOTAL.ends_with("_total"));
        assert!(names::DETECTIONS_TOTAL.starts_with("lens_"));
    }
}
