//! Pipeline metrics collection.

use metrics::{counter, gauge};

/// Metric name constants for consistency.
pub mod names {
    /// Frames acquired from the camera.
    pub const FRAMES_CAPTURED_TOTAL: &str = "lens_frames_captured_total";

    /// Frames skipped, by reason.
    pub const FRAMES_SKIPPED_TOTAL: &str = "lens_frames_skipped_total";

    /// Batches published on the event bus.
    pub const BATCHES_PUBLISHED_TOTAL: &str = "lens_batches_published_total";

    /// Batches dropped from a full subscriber queue, by subscriber.
    pub const BUS_DROPPED_TOTAL: &str = "lens_bus_dropped_total";

    /// Failed or panicked observer deliveries, by subscriber.
    pub const OBSERVER_FAILURES_TOTAL: &str = "lens_observer_failures_total";

    /// Cache lookups by result (hit, miss, coalesced).
    pub const CACHE_LOOKUPS_TOTAL: &str = "lens_cache_lookups_total";

    /// Completed entries currently cached.
    pub const CACHE_ENTRIES: &str = "lens_cache_entries";

    /// Component liveness (1 live, 0 dead), by component.
    pub const COMPONENT_LIVE: &str = "lens_component_live";

    /// Overall health (1 healthy, 0 unhealthy).
    pub const HEALTHY: &str = "lens_healthy";
}

pub fn record_frame_captured() {
    counter!(names::FRAMES_CAPTURED_TOTAL).increment(1);
}

pub fn record_frame_skipped(reason: &'static str) {
    counter!(names::FRAMES_SKIPPED_TOTAL, "reason" => reason).increment(1);
}

pub fn record_published() {
    counter!(names::BATCHES_PUBLISHED_TOTAL).increment(1);
}

pub fn record_bus_drop(subscriber: &str) {
    counter!(names::BUS_DROPPED_TOTAL, "subscriber" => subscriber.to_string()).increment(1);
}

pub fn record_observer_failure(subscriber: &str) {
    counter!(names::OBSERVER_FAILURES_TOTAL, "subscriber" => subscriber.to_string()).increment(1);
}

pub fn record_cache_lookup(result: &'static str) {
    counter!(names::CACHE_LOOKUPS_TOTAL, "result" => result).increment(1);
}

pub fn record_cache_size(entries: usize) {
    gauge!(names::CACHE_ENTRIES).set(entries as f64);
}

pub fn record_component(component: &str, live: bool) {
    gauge!(names::COMPONENT_LIVE, "component" => component.to_string())
        .set(if live { 1.0 } else { 0.0 });
}

pub fn record_healthy(healthy: bool) {
    gauge!(names::HEALTHY).set(if healthy { 1.0 } else { 0.0 });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::FRAMES_CAPTURED_TOTAL.ends_with("_total"));
        assert!(names::BUS_DROPPED_TOTAL.contains("dropped"));
        assert!(names::CACHE_LOOKUPS_TOTAL.contains("cache"));
        assert!(names::COMPONENT_LIVE.starts_with("lens_"));
    }
}
