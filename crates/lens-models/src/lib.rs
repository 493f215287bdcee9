//! Shared data models for the SceneLens pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Captured color+depth frames
//! - Detections, bounding boxes and per-frame detection batches
//! - Detection queries and per-class summaries
//! - Component health reports

pub mod detection;
pub mod frame;
pub mod health;
pub mod query;
pub mod summary;

// Re-export common types
pub use detection::{BBox, Detection, DetectionBatch};
pub use frame::{Frame, FrameError};
pub use health::{ComponentHealth, HealthStatus};
pub use query::DetectionQuery;
pub use summary::{ClassSummary, DetectionSummary};
