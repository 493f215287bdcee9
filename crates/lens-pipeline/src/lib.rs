//! Capture pipeline for SceneLens.
//!
//! Wires the vision stages together and fans results out:
//! - `Pipeline`: start/stop controller and the capture loop
//! - `EventBus`: bounded per-subscriber delivery with drop-oldest overflow
//! - `ResultCache`: single-flight LRU cache keyed by frame fingerprint
//! - `HealthMonitor`: liveness probes and overall health

pub mod cache;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod health;
pub mod metrics;
pub mod pipeline;

pub use cache::{CacheComputeError, ResultCache};
pub use config::{CacheConfig, PipelineConfig};
pub use error::{PipelineError, PipelineResult};
pub use event_bus::{EventBus, Observer, ObserverError, SubscriptionHandle};
pub use health::{
    CacheProbe, CaptureProbe, DetectorProbe, EnrichmentProbe, EventBusProbe, HealthMonitor,
    LivenessProbe,
};
pub use pipeline::{DriverFactory, EngineFactory, Pipeline, PipelineStatus};
