//! Error types for pipeline operations.

use lens_vision::VisionError;
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors surfaced by the pipeline controller.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline is already running")]
    AlreadyRunning,

    #[error("Pipeline is not running")]
    NotRunning,

    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error("Cache computation failed: {0}")]
    CacheCompute(#[from] crate::cache::CacheComputeError),

    #[error("Shutdown failed: {0}")]
    Shutdown(String),
}

impl PipelineError {
    pub fn shutdown(message: impl Into<String>) -> Self {
        Self::Shutdown(message.into())
    }
}
