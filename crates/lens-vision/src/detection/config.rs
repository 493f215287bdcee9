//! Detector configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::labels::{COCO_CLASSES, VOC_CLASSES};

/// Closed set of supported detector backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelVariant {
    /// YOLOv8 exported to ONNX, output `[1, 84, N]`
    YoloV8,
    /// Caffe MobileNet-SSD converted to ONNX, output `[1, 1, N, 7]`
    MobileNetSsd,
}

/// Input normalization: `(pixel - mean) * scale`, optionally in BGR order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    pub scale: f32,
    pub mean: f32,
    pub bgr: bool,
}

impl ModelVariant {
    pub const ALL: [ModelVariant; 2] = [ModelVariant::YoloV8, ModelVariant::MobileNetSsd];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelVariant::YoloV8 => "yolo_v8",
            ModelVariant::MobileNetSsd => "mobilenet_ssd",
        }
    }

    pub fn default_input_resolution(&self) -> (u32, u32) {
        match self {
            ModelVariant::YoloV8 => (640, 640),
            ModelVariant::MobileNetSsd => (300, 300),
        }
    }

    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            ModelVariant::YoloV8 => COCO_CLASSES,
            ModelVariant::MobileNetSsd => VOC_CLASSES,
        }
    }

    pub fn normalization(&self) -> Normalization {
        match self {
            ModelVariant::YoloV8 => Normalization {
                scale: 1.0 / 255.0,
                mean: 0.0,
                bgr: false,
            },
            ModelVariant::MobileNetSsd => Normalization {
                scale: 0.007843,
                mean: 127.5,
                bgr: true,
            },
        }
    }

    /// Name of the graph output holding detections.
    pub fn output_name(&self) -> &'static str {
        match self {
            ModelVariant::YoloV8 => "output0",
            ModelVariant::MobileNetSsd => "detection_out",
        }
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "yolo_v8" | "yolov8" | "yolo" => Ok(ModelVariant::YoloV8),
            "mobilenet_ssd" | "mobilenetssd" | "ssd" => Ok(ModelVariant::MobileNetSsd),
            other => Err(format!("unknown model variant: {}", other)),
        }
    }
}

/// The two files a detector needs: graph topology and trained weights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    pub topology: String,
    pub weights: String,
}

impl ModelFiles {
    pub fn for_variant(variant: ModelVariant) -> Self {
        match variant {
            ModelVariant::YoloV8 => Self {
                topology: "models/yolov8n.onnx".to_string(),
                weights: "models/yolov8n.onnx.data".to_string(),
            },
            ModelVariant::MobileNetSsd => Self {
                topology: "models/MobileNetSSD_deploy.onnx".to_string(),
                weights: "models/MobileNetSSD_deploy.onnx.data".to_string(),
            },
        }
    }
}

/// Configuration for the detection engine.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_variant: ModelVariant,
    /// Detections scoring below this are dropped
    pub confidence_threshold: f32,
    /// Same-class boxes overlapping above this IoU are suppressed
    pub nms_iou_threshold: f32,
    /// Model input size as (width, height)
    pub input_resolution: (u32, u32),
    pub files: ModelFiles,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::for_variant(ModelVariant::YoloV8)
    }
}

impl DetectorConfig {
    pub fn for_variant(model_variant: ModelVariant) -> Self {
        Self {
            model_variant,
            confidence_threshold: 0.5,
            nms_iou_threshold: 0.45,
            input_resolution: model_variant.default_input_resolution(),
            files: ModelFiles::for_variant(model_variant),
        }
    }

    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let model_variant = std::env::var("LENS_MODEL_VARIANT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(ModelVariant::YoloV8);
        let defaults = Self::for_variant(model_variant);
        let (default_w, default_h) = defaults.input_resolution;

        Self {
            model_variant,
            confidence_threshold: std::env::var("LENS_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            nms_iou_threshold: std::env::var("LENS_NMS_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.nms_iou_threshold),
            input_resolution: (
                std::env::var("LENS_INPUT_WIDTH")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default_w),
                std::env::var("LENS_INPUT_HEIGHT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default_h),
            ),
            files: ModelFiles {
                topology: std::env::var("LENS_MODEL_TOPOLOGY").unwrap_or(defaults.files.topology),
                weights: std::env::var("LENS_MODEL_WEIGHTS").unwrap_or(defaults.files.weights),
            },
        }
    }

    /// Reject thresholds outside [0, 1] and empty input sizes.
    pub fn validate(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(format!(
                "confidence_threshold must be within [0, 1], got {}",
                self.confidence_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.nms_iou_threshold) {
            return Err(format!(
                "nms_iou_threshold must be within [0, 1], got {}",
                self.nms_iou_threshold
            ));
        }
        if self.input_resolution.0 == 0 || self.input_resolution.1 == 0 {
            return Err("input_resolution must be non-zero".to_string());
        }
        Ok(())
    }
}
