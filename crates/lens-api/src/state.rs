//! Application state.

use std::sync::Arc;

use lens_enrich::{EnrichmentClient, EnrichmentConfig};
use lens_models::DetectionBatch;
use lens_pipeline::{CacheConfig, HealthMonitor, Pipeline, PipelineConfig};
use lens_vision::{CameraDriver, DepthConfig, DetectionEngine, DetectorConfig, SyntheticCamera};
use tracing::info;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub pipeline: Arc<Pipeline>,
    pub health: Arc<HealthMonitor>,
    /// `None` when enrichment is disabled
    pub enrichment: Option<Arc<EnrichmentClient>>,
}

impl AppState {
    /// Wire state around an existing pipeline.
    pub fn new(
        config: ApiConfig,
        pipeline: Arc<Pipeline>,
        enrichment: Option<Arc<EnrichmentClient>>,
    ) -> Self {
        let health = Arc::new(HealthMonitor::for_pipeline(&pipeline, enrichment.clone()));
        Self {
            config,
            pipeline,
            health,
            enrichment,
        }
    }

    /// Create application state from environment variables.
    pub fn from_env(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let detector = DetectorConfig::from_env();
        detector.validate()?;
        let camera = SyntheticCamera::from_env();

        info!(
            model = %detector.model_variant,
            topology = %detector.files.topology,
            camera = %format!("{}x{}@{}", camera.width, camera.height, camera.fps),
            "Pipeline configuration loaded"
        );

        let pipeline = Pipeline::new(
            PipelineConfig::from_env(),
            move || -> Box<dyn CameraDriver> { Box::new(camera.clone()) },
            move || DetectionEngine::new(detector.clone()),
        )
        .with_cache(CacheConfig::from_env())
        .with_depth(DepthConfig::from_env());

        let enrich_config = EnrichmentConfig::from_env();
        let enrichment = if enrich_config.enabled {
            info!(
                base_url = %enrich_config.base_url,
                model = %enrich_config.model,
                "Enrichment enabled"
            );
            Some(Arc::new(EnrichmentClient::new(enrich_config)?))
        } else {
            info!("Enrichment disabled");
            None
        };

        Ok(Self::new(config, Arc::new(pipeline), enrichment))
    }

    /// Immutable snapshot of the last published batch.
    pub fn latest(&self) -> Option<Arc<DetectionBatch>> {
        self.pipeline.bus().latest()
    }

    pub fn enrichment(&self) -> Option<&Arc<EnrichmentClient>> {
        self.enrichment.as_ref()
    }
}
