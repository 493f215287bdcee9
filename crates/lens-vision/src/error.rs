//! Error types for vision operations.

use std::time::Duration;
use thiserror::Error;

/// Result type for vision operations.
pub type VisionResult<T> = Result<T, VisionError>;

/// Errors that can occur while acquiring or analyzing frames.
#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Frame acquisition timed out after {0:?}")]
    AcquisitionTimeout(Duration),

    #[error("Frame acquisition failed: {0}")]
    Acquisition(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Detector backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl VisionError {
    /// Create an acquisition failure error.
    pub fn acquisition(message: impl Into<String>) -> Self {
        Self::Acquisition(message.into())
    }

    /// Create an inference failure error.
    pub fn inference(message: impl Into<String>) -> Self {
        Self::Inference(message.into())
    }

    /// Create a model not found error.
    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::ModelNotFound(path.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// True for failures of the camera link rather than a single slow read.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, VisionError::Acquisition(_))
    }
}
