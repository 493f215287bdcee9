//! ONNX Runtime backend.
//!
//! Execution provider selection:
//! - CUDA on Linux with NVIDIA GPU (when `cuda` feature enabled)
//! - CoreML on macOS
//! - CPU fallback on all platforms

use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use super::config::{DetectorConfig, ModelVariant};
use super::decode::RawOutput;
use super::model::InferenceModel;
use super::preprocess::PreprocessedInput;
use crate::error::{VisionError, VisionResult};

pub struct OnnxModel {
    session: Session,
    variant: ModelVariant,
}

impl OnnxModel {
    pub fn load(config: &DetectorConfig) -> VisionResult<Self> {
        let session = create_session(Path::new(&config.files.topology))?;
        info!(
            topology = %config.files.topology,
            weights = %config.files.weights,
            variant = %config.model_variant,
            "ONNX model loaded"
        );
        Ok(Self {
            session,
            variant: config.model_variant,
        })
    }
}

impl InferenceModel for OnnxModel {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn infer(&mut self, input: &PreprocessedInput) -> VisionResult<RawOutput> {
        let tensor = Tensor::from_array((input.shape(), input.data.clone().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| VisionError::inference(format!("Failed to create tensor: {}", e)))?;

        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| VisionError::inference(format!("ONNX inference failed: {}", e)))?;

        let output_name = self.variant.output_name();
        let output = outputs
            .get(output_name)
            .ok_or_else(|| VisionError::inference(format!("Missing {} tensor", output_name)))?;

        let extracted = output
            .try_extract_tensor::<f32>()
            .map_err(|e| VisionError::inference(format!("Failed to extract tensor: {}", e)))?;
        let (shape, data) = extracted;
        let shape = shape
            .iter()
            .map(|&dim| usize::try_from(dim))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VisionError::inference(format!("Dynamic output shape: {:?}", shape)))?;

        Ok(RawOutput::new(shape, data.to_vec()))
    }
}

/// Create ONNX Runtime session with automatic execution provider selection.
fn create_session(model_path: &Path) -> VisionResult<Session> {
    let builder = Session::builder()
        .map_err(|e| VisionError::internal(format!("Failed to create session builder: {}", e)))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| VisionError::internal(format!("Failed to set optimization level: {}", e)))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_file(model_path) {
                info!("Using CUDA execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_file(model_path) {
                info!("Using CoreML execution provider for object detection");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    // External weights are resolved relative to the topology file.
    debug!(path = %model_path.display(), "Using CPU execution provider for object detection");
    builder
        .commit_from_file(model_path)
        .map_err(|e| VisionError::model_not_found(format!("{}: {}", model_path.display(), e)))
}
