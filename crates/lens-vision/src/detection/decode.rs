//! Raw model output decoding.
//!
//! Each decoder turns a raw tensor into confidence-filtered candidates with
//! boxes in source-frame pixels, in model output order.

use lens_models::BBox;
use ndarray::ArrayView2;

use crate::error::{VisionError, VisionResult};

/// Raw output tensor as returned by the inference runtime.
#[derive(Debug, Clone, Default)]
pub struct RawOutput {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl RawOutput {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }
}

/// A decoded box before NMS.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BBox,
}

/// Clamp a corner-format box into the frame.
fn clamped_box(x1: f32, y1: f32, x2: f32, y2: f32, frame_w: f32, frame_h: f32) -> BBox {
    let x1 = x1.clamp(0.0, frame_w);
    let y1 = y1.clamp(0.0, frame_h);
    let x2 = x2.clamp(x1, frame_w);
    let y2 = y2.clamp(y1, frame_h);
    BBox::from_corners(x1, y1, x2, y2)
}

/// Decode YOLOv8 output `[1, 4 + C, N]`.
///
/// Rows 0..4 hold `(cx, cy, w, h)` in model-input pixels, the remaining rows
/// hold per-class scores. The class row count must equal `num_classes`.
pub fn decode_yolov8(
    output: &RawOutput,
    input: (u32, u32),
    frame: (u32, u32),
    num_classes: usize,
    confidence_threshold: f32,
) -> VisionResult<Vec<Candidate>> {
    let (num_features, num_boxes) = match output.shape.as_slice() {
        [1, f, n] | [f, n] => (*f, *n),
        other => {
            return Err(VisionError::inference(format!(
                "Unexpected YOLOv8 output shape: {:?}",
                other
            )))
        }
    };
    if num_features <= 4 {
        return Err(VisionError::inference(format!(
            "YOLOv8 output has no class rows: {} features",
            num_features
        )));
    }
    if num_features - 4 != num_classes {
        return Err(VisionError::inference(format!(
            "YOLOv8 output has {} class rows, expected {}",
            num_features - 4,
            num_classes
        )));
    }

    // [4 + C, N] -> [N, 4 + C]
    let view = ArrayView2::from_shape((num_features, num_boxes), &output.data)
        .map_err(|e| VisionError::inference(format!("Failed to reshape output: {}", e)))?;
    let rows = view.t();

    let scale_w = frame.0 as f32 / input.0 as f32;
    let scale_h = frame.1 as f32 / input.1 as f32;
    let (frame_w, frame_h) = (frame.0 as f32, frame.1 as f32);

    let mut candidates = Vec::new();
    for row in rows.outer_iter() {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for (c, &score) in row.iter().skip(4).enumerate() {
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }

        if !best_score.is_finite() || best_score < confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        if !(cx.is_finite() && cy.is_finite() && w.is_finite() && h.is_finite()) {
            continue;
        }

        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score.min(1.0),
            bbox: clamped_box(
                (cx - w / 2.0) * scale_w,
                (cy - h / 2.0) * scale_h,
                (cx + w / 2.0) * scale_w,
                (cy + h / 2.0) * scale_h,
                frame_w,
                frame_h,
            ),
        });
    }

    Ok(candidates)
}

/// Decode SSD `DetectionOutput` `[1, 1, N, 7]`.
///
/// Each row is `[image_id, class_id, confidence, x1, y1, x2, y2]` with
/// corners normalized to [0, 1]. Class 0 is background.
pub fn decode_ssd(
    output: &RawOutput,
    frame: (u32, u32),
    num_classes: usize,
    confidence_threshold: f32,
) -> VisionResult<Vec<Candidate>> {
    if output.data.len() % 7 != 0 || output.shape.last().copied() != Some(7) {
        return Err(VisionError::inference(format!(
            "Unexpected SSD output shape: {:?}",
            output.shape
        )));
    }

    let (frame_w, frame_h) = (frame.0 as f32, frame.1 as f32);
    let mut candidates = Vec::new();

    for row in output.data.chunks_exact(7) {
        let confidence = row[2];
        if !confidence.is_finite() || confidence < confidence_threshold {
            continue;
        }

        let class = row[1];
        if !class.is_finite() || class < 1.0 || class as usize >= num_classes {
            continue;
        }

        let corners = [row[3], row[4], row[5], row[6]];
        if corners.iter().any(|v| !v.is_finite()) {
            continue;
        }

        candidates.push(Candidate {
            class_id: class as usize,
            confidence: confidence.min(1.0),
            bbox: clamped_box(
                corners[0] * frame_w,
                corners[1] * frame_h,
                corners[2] * frame_w,
                corners[3] * frame_h,
                frame_w,
                frame_h,
            ),
        });
    }

    Ok(candidates)
}
