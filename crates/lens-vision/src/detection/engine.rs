//! Detection engine: preprocess, infer, decode, filter, suppress.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use lens_models::{Detection, DetectionBatch, Frame};
use tracing::{debug, info, warn};

use super::config::{DetectorConfig, ModelVariant};
use super::decode::{decode_ssd, decode_yolov8, Candidate};
use super::model::{load_model, InferenceModel};
use super::nms::non_maximum_suppression;
use super::preprocess::preprocess;
use crate::error::{VisionError, VisionResult};
use crate::metrics;

/// Consecutive inference failures after which the detector reports unhealthy.
pub const FATAL_CONSECUTIVE_FAILURES: u32 = 3;

/// Object detector over one loaded model.
///
/// At most one inference runs at a time; `detect` is blocking and should be
/// called from a blocking worker.
pub struct DetectionEngine {
    config: DetectorConfig,
    model: Mutex<Box<dyn InferenceModel>>,
    consecutive_failures: AtomicU32,
}

impl DetectionEngine {
    /// Load the configured model.
    ///
    /// Fails with `ModelNotFound` when a model file is missing and with
    /// `BackendUnavailable` when no runtime is compiled in.
    pub fn new(config: DetectorConfig) -> VisionResult<Self> {
        config.validate().map_err(VisionError::internal)?;
        let model = load_model(&config)?;
        Self::with_model(config, model)
    }

    /// Build an engine around an already loaded model.
    pub fn with_model(config: DetectorConfig, model: Box<dyn InferenceModel>) -> VisionResult<Self> {
        config.validate().map_err(VisionError::internal)?;
        info!(
            variant = %config.model_variant,
            backend = model.name(),
            input_width = config.input_resolution.0,
            input_height = config.input_resolution.1,
            confidence_threshold = config.confidence_threshold,
            nms_iou_threshold = config.nms_iou_threshold,
            "Detection engine initialized"
        );
        Ok(Self {
            config,
            model: Mutex::new(model),
            consecutive_failures: AtomicU32::new(0),
        })
    }

    /// Detect objects in a frame.
    ///
    /// Detections come back in detector output order with confidences in
    /// [0, 1] and no distance attached.
    pub fn detect(&self, frame: &Frame) -> VisionResult<DetectionBatch> {
        let started = Instant::now();
        let variant = self.config.model_variant.as_str();

        match self.run(frame) {
            Ok(batch) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
                metrics::record_inference(variant, started.elapsed().as_secs_f64(), batch.len());
                debug!(
                    frame_id = frame.id(),
                    count = batch.len(),
                    "Object detection completed"
                );
                Ok(batch)
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                metrics::record_inference_failure(variant);
                warn!(
                    frame_id = frame.id(),
                    consecutive_failures = failures,
                    error = %e,
                    "Object detection failed"
                );
                Err(e)
            }
        }
    }

    fn run(&self, frame: &Frame) -> VisionResult<DetectionBatch> {
        let variant = self.config.model_variant;
        let input = preprocess(frame, self.config.input_resolution, variant.normalization())?;

        let raw = {
            let mut model = self
                .model
                .lock()
                .map_err(|_| VisionError::internal("Model lock poisoned"))?;
            model.infer(&input)?
        };

        let frame_dims = (frame.width(), frame.height());
        let threshold = self.config.confidence_threshold;
        let labels = variant.labels();
        let candidates: Vec<Candidate> = match variant {
            ModelVariant::YoloV8 => decode_yolov8(
                &raw,
                self.config.input_resolution,
                frame_dims,
                labels.len(),
                threshold,
            )?,
            ModelVariant::MobileNetSsd => decode_ssd(&raw, frame_dims, labels.len(), threshold)?,
        };

        let detections = non_maximum_suppression(&candidates, self.config.nms_iou_threshold)
            .into_iter()
            .filter_map(|i| {
                let candidate = &candidates[i];
                let label = labels.get(candidate.class_id)?;
                Detection::new(*label, candidate.confidence, candidate.bbox)
            })
            .collect();

        Ok(DetectionBatch::new(frame.id(), frame.timestamp(), detections))
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    /// False once `FATAL_CONSECUTIVE_FAILURES` inferences failed in a row.
    pub fn is_live(&self) -> bool {
        self.consecutive_failures() < FATAL_CONSECUTIVE_FAILURES
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}
