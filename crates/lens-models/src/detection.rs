//! Detection models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::query::DetectionQuery;
use crate::summary::DetectionSummary;

/// Axis-aligned bounding box in source-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from corner coordinates `(x1, y1, x2, y2)`.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self::new(x1, y1, x2 - x1, y2 - y1)
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    /// Intersection over Union with another box.
    pub fn iou(&self, other: &BBox) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - intersection;

        if union > 0.0 {
            intersection / union
        } else {
            0.0
        }
    }
}

/// A single detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Detection {
    /// Class label from the detector's label set
    pub class_label: String,
    /// Detection confidence, always within [0, 1]
    pub confidence: f32,
    /// Bounding box in pixels
    pub bbox: BBox,
    /// Distance in meters, `None` when depth was missing or out of range
    pub distance_m: Option<f32>,
}

impl Detection {
    /// Create a detection without distance.
    ///
    /// Returns `None` for a non-finite confidence or box. Finite confidences
    /// outside [0, 1] are clamped.
    pub fn new(class_label: impl Into<String>, confidence: f32, bbox: BBox) -> Option<Self> {
        if !confidence.is_finite() || !bbox.is_finite() {
            return None;
        }
        Some(Self {
            class_label: class_label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            bbox,
            distance_m: None,
        })
    }

    /// Attach a distance. Negative or non-finite values become `None`.
    pub fn with_distance(mut self, distance_m: Option<f32>) -> Self {
        self.distance_m = distance_m.filter(|d| d.is_finite() && *d >= 0.0);
        self
    }
}

/// All detections for one frame, in detector output order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionBatch {
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(frame_id: u64, timestamp: DateTime<Utc>, detections: Vec<Detection>) -> Self {
        Self {
            frame_id,
            timestamp,
            detections,
        }
    }

    pub fn empty(frame_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self::new(frame_id, timestamp, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Copy of this batch attributed to another frame.
    ///
    /// Used when a cached result is reused for a perceptually identical frame.
    pub fn restamp(&self, frame_id: u64, timestamp: DateTime<Utc>) -> Self {
        Self::new(frame_id, timestamp, self.detections.clone())
    }

    /// Detections matching a query, preserving order.
    pub fn query(&self, query: &DetectionQuery) -> Vec<Detection> {
        self.detections
            .iter()
            .filter(|d| query.matches(d))
            .cloned()
            .collect()
    }

    /// Per-class counts and average distances.
    pub fn summary(&self) -> DetectionSummary {
        DetectionSummary::from_batch(self)
    }
}
