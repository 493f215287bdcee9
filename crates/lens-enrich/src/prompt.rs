//! Prompt construction from detection context.

use std::fmt::Write;

use lens_models::{DetectionBatch, DetectionSummary};

fn format_distance(distance_m: Option<f32>) -> String {
    match distance_m {
        Some(d) => format!("{:.2}m", d),
        None => "unknown distance".to_string(),
    }
}

/// Render the scene described by a batch as plain text.
///
/// Lists the total, a line per class with its average distance, and a line
/// per detection. Missing distances are written out as unknown.
pub fn scene_context(batch: &DetectionBatch) -> String {
    let summary = DetectionSummary::from_batch(batch);
    let mut out = String::new();

    let _ = writeln!(out, "Current scene from the RGB-D camera:");
    let _ = writeln!(out, "- Frame: {}", batch.frame_id);
    let _ = writeln!(out, "- Timestamp: {}", batch.timestamp.to_rfc3339());
    let _ = writeln!(out, "- Total objects detected: {}", summary.total_objects);

    if !summary.objects.is_empty() {
        let _ = writeln!(out, "\nObjects by class:");
        for class in &summary.objects {
            let _ = writeln!(
                out,
                "- {}: {} detected (average distance: {})",
                class.class_label,
                class.count,
                format_distance(class.average_distance_m)
            );
        }

        let _ = writeln!(out, "\nDetections:");
        for detection in &batch.detections {
            let _ = writeln!(
                out,
                "- {} at {} (confidence: {:.2})",
                detection.class_label,
                format_distance(detection.distance_m),
                detection.confidence
            );
        }
    }

    out
}

/// Wrap a user prompt with the scene context.
pub fn enhanced_prompt(user_prompt: &str, batch: &DetectionBatch) -> String {
    format!(
        "{context}\n\
         The detector only recognizes a fixed set of object classes. Use the \
         detections above as ground truth, and use general knowledge to infer \
         what else is likely present, describe spatial relationships and \
         answer questions about the scene as a whole.\n\n\
         User query: {prompt}\n",
        context = scene_context(batch),
        prompt = user_prompt.trim(),
    )
}

/// Ask for an open-ended analysis of the scene.
pub fn scene_analysis_prompt(batch: &DetectionBatch) -> String {
    format!(
        "Analyze this scene from an RGB-D camera feed.\n\n\
         {context}\n\
         Based on this data, describe:\n\
         1. What is probably happening in the scene\n\
         2. Objects likely present that the detector cannot identify\n\
         3. Spatial relationships between the objects\n\
         4. Activities or contexts the detected objects suggest\n\
         5. Any safety concerns or notable observations\n",
        context = scene_context(batch),
    )
}
