//! Inference runtime seam.

use std::path::Path;

use super::config::DetectorConfig;
use super::decode::RawOutput;
use super::preprocess::PreprocessedInput;
use crate::error::{VisionError, VisionResult};

/// A loaded detection network.
///
/// `infer` takes `&mut self`; the engine guarantees one call at a time.
pub trait InferenceModel: Send {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Run the network on one preprocessed input.
    fn infer(&mut self, input: &PreprocessedInput) -> VisionResult<RawOutput>;
}

/// Load the runtime model for a configuration.
///
/// Both model files must exist. The `onnx` feature is on by default; a
/// build without it has no runtime and fails with `BackendUnavailable`.
pub fn load_model(config: &DetectorConfig) -> VisionResult<Box<dyn InferenceModel>> {
    for path in [&config.files.topology, &config.files.weights] {
        if !Path::new(path).exists() {
            return Err(VisionError::model_not_found(path));
        }
    }

    #[cfg(feature = "onnx")]
    {
        let model = super::onnx::OnnxModel::load(config)?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    {
        Err(VisionError::BackendUnavailable(format!(
            "{} requires the `onnx` feature",
            config.model_variant
        )))
    }
}

/// Check if both model files for a configuration are present.
pub fn is_model_available(config: &DetectorConfig) -> bool {
    Path::new(&config.files.topology).exists() && Path::new(&config.files.weights).exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::config::ModelFiles;

    #[test]
    fn test_missing_files_report_model_not_found() {
        let config = DetectorConfig {
            files: ModelFiles {
                topology: "/nonexistent/model.onnx".to_string(),
                weights: "/nonexistent/model.onnx.data".to_string(),
            },
            ..Default::default()
        };

        assert!(!is_model_available(&config));
        match load_model(&config) {
            Err(VisionError::ModelNotFound(path)) => assert_eq!(path, "/nonexistent/model.onnx"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("model should not load"),
        }
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_default_build_hands_files_to_runtime() {
        let dir = std::env::temp_dir().join(format!("lens-model-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let topology = dir.join("broken.onnx");
        let weights = dir.join("broken.onnx.data");
        std::fs::write(&topology, b"not a model").unwrap();
        std::fs::write(&weights, b"").unwrap();

        let config = DetectorConfig {
            files: ModelFiles {
                topology: topology.display().to_string(),
                weights: weights.display().to_string(),
            },
            ..Default::default()
        };
        let result = load_model(&config);
        std::fs::remove_dir_all(&dir).ok();

        // The runtime is compiled in, so a corrupt file fails to parse
        // rather than reporting a missing backend.
        match result {
            Err(VisionError::BackendUnavailable(msg)) => panic!("backend missing: {msg}"),
            Err(_) => {}
            Ok(_) => panic!("corrupt model should not load"),
        }
    }
}
