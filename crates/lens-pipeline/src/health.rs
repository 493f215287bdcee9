//! Component liveness and overall health.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lens_enrich::EnrichmentClient;
use lens_models::{ComponentHealth, HealthStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::event_bus::EventBus;
use crate::metrics;
use crate::pipeline::Pipeline;

/// Side-effect free liveness check for one component.
pub trait LivenessProbe: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this component counts toward overall health.
    fn required(&self) -> bool {
        true
    }

    fn is_live(&self) -> bool;
}

/// Camera capture: not halted and producing frames while running.
pub struct CaptureProbe(pub Arc<Pipeline>);

impl LivenessProbe for CaptureProbe {
    fn name(&self) -> &str {
        "capture"
    }

    fn is_live(&self) -> bool {
        self.0.capture_live()
    }
}

/// Detector: fewer than three consecutive inference failures.
pub struct DetectorProbe(pub Arc<Pipeline>);

impl LivenessProbe for DetectorProbe {
    fn name(&self) -> &str {
        "detector"
    }

    fn is_live(&self) -> bool {
        self.0.detector_live()
    }
}

pub struct EventBusProbe(pub EventBus);

impl LivenessProbe for EventBusProbe {
    fn name(&self) -> &str {
        "event_bus"
    }

    fn is_live(&self) -> bool {
        !self.0.is_closed()
    }
}

pub struct CacheProbe(pub Arc<ResultCache>);

impl LivenessProbe for CacheProbe {
    fn name(&self) -> &str {
        "cache"
    }

    fn is_live(&self) -> bool {
        self.0.is_healthy()
    }
}

/// Enrichment is optional: an open breaker is reported but never fails
/// overall health.
pub struct EnrichmentProbe(pub Arc<EnrichmentClient>);

impl LivenessProbe for EnrichmentProbe {
    fn name(&self) -> &str {
        "enrichment"
    }

    fn required(&self) -> bool {
        false
    }

    fn is_live(&self) -> bool {
        !self.0.breaker().is_open()
    }
}

/// Aggregates registered probes into a [`HealthStatus`].
#[derive(Default, Clone)]
pub struct HealthMonitor {
    probes: Vec<Arc<dyn LivenessProbe>>,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Monitor with the standard probes for a pipeline.
    pub fn for_pipeline(pipeline: &Arc<Pipeline>, enrichment: Option<Arc<EnrichmentClient>>) -> Self {
        let mut monitor = Self::new()
            .with_probe(CaptureProbe(Arc::clone(pipeline)))
            .with_probe(DetectorProbe(Arc::clone(pipeline)))
            .with_probe(EventBusProbe(pipeline.bus().clone()))
            .with_probe(CacheProbe(Arc::clone(pipeline.cache())));
        if let Some(client) = enrichment {
            monitor.register(Arc::new(EnrichmentProbe(client)));
        }
        monitor
    }

    pub fn register(&mut self, probe: Arc<dyn LivenessProbe>) {
        self.probes.push(probe);
    }

    pub fn with_probe(mut self, probe: impl LivenessProbe + 'static) -> Self {
        self.register(Arc::new(probe));
        self
    }

    /// Evaluate every probe now.
    pub fn poll(&self) -> HealthStatus {
        let components: BTreeMap<String, ComponentHealth> = self
            .probes
            .iter()
            .map(|probe| {
                (
                    probe.name().to_string(),
                    ComponentHealth {
                        live: probe.is_live(),
                        required: probe.required(),
                    },
                )
            })
            .collect();
        HealthStatus::from_components(components)
    }

    /// Refresh the liveness gauges every `interval` until `shutdown` flips.
    pub fn spawn_poller(
        self,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            // `interval` panics on a zero period.
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            let mut was_healthy = true;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let status = self.poll();
                for (name, component) in &status.components {
                    metrics::record_component(name, component.live);
                }
                metrics::record_healthy(status.healthy);

                if was_healthy && !status.healthy {
                    let failing: Vec<&str> = status
                        .components
                        .iter()
                        .filter(|(_, c)| c.required && !c.live)
                        .map(|(name, _)| name.as_str())
                        .collect();
                    warn!(failing = ?failing, "System unhealthy");
                } else if !was_healthy && status.healthy {
                    debug!("System healthy again");
                }
                was_healthy = status.healthy;
            }
        })
    }
}
