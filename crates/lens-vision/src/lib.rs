//! Vision stages of the SceneLens pipeline.
//!
//! This crate provides:
//! - `FrameSource`: owned camera handle with a dedicated reader thread and
//!   bounded reconnect backoff
//! - `DetectionEngine`: preprocessing, backend inference, decoding, confidence
//!   filtering and per-class NMS over a closed set of model variants
//! - `DepthFuser`: per-detection distance from the aligned depth map
//! - `frame_key`: perceptual fingerprint used to deduplicate work

pub mod depth;
pub mod detection;
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod source;

pub use depth::{DepthConfig, DepthFuser};
pub use detection::{
    DetectionEngine, DetectorConfig, InferenceModel, ModelFiles, ModelVariant,
    PreprocessedInput, RawOutput, FATAL_CONSECUTIVE_FAILURES,
};
pub use error::{VisionError, VisionResult};
pub use fingerprint::{frame_key, FrameKey};
pub use source::{
    BackoffPolicy, CameraDriver, CameraHandle, DriverError, FrameSource, RawCapture,
    SyntheticCamera,
};
