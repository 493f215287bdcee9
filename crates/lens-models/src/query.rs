//! Detection query filters.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::Detection;

fn default_min_confidence() -> f32 {
    0.5
}

/// Filter over a detection batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionQuery {
    /// Exact class label to match; `None` matches every class
    #[serde(default)]
    pub class: Option<String>,
    /// Minimum confidence, inclusive
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Maximum distance in meters, inclusive. Detections with unknown
    /// distance never match when this is set.
    #[serde(default, rename = "max_distance")]
    pub max_distance_m: Option<f32>,
}

impl Default for DetectionQuery {
    fn default() -> Self {
        Self {
            class: None,
            min_confidence: default_min_confidence(),
            max_distance_m: None,
        }
    }
}

impl DetectionQuery {
    /// Validate the query.
    pub fn validate(&self) -> Result<(), String> {
        if !self.min_confidence.is_finite() || !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            ));
        }
        if let Some(max) = self.max_distance_m {
            if !max.is_finite() || max < 0.0 {
                return Err(format!("max_distance must be a non-negative number, got {}", max));
            }
        }
        Ok(())
    }

    pub fn matches(&self, detection: &Detection) -> bool {
        if let Some(class) = &self.class {
            if detection.class_label != *class {
                return false;
            }
        }
        if detection.confidence < self.min_confidence {
            return false;
        }
        match (self.max_distance_m, detection.distance_m) {
            (Some(max), Some(distance)) => distance <= max,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}
