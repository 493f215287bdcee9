//! Object detection over a closed set of model variants.
//!
//! Each variant fixes its preprocessing, raw-output decoder and label set.
//! The runtime is behind `InferenceModel`; the ONNX Runtime implementation is
//! compiled in with the default `onnx` feature.

mod config;
mod decode;
mod engine;
mod labels;
mod model;
mod nms;
#[cfg(feature = "onnx")]
mod onnx;
mod preprocess;

pub use config::{DetectorConfig, ModelFiles, ModelVariant, Normalization};
pub use decode::{decode_ssd, decode_yolov8, Candidate, RawOutput};
pub use engine::{DetectionEngine, FATAL_CONSECUTIVE_FAILURES};
pub use labels::{COCO_CLASSES, VOC_CLASSES};
pub use model::{is_model_available, load_model, InferenceModel};
pub use nms::non_maximum_suppression;
pub use preprocess::{preprocess, PreprocessedInput};
