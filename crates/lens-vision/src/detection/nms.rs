//! Per-class non-maximum suppression.

use super::decode::Candidate;

/// Apply per-class NMS and return surviving candidate indices in their
/// original order.
///
/// Boxes are visited by descending confidence; a box is suppressed when it
/// overlaps an already kept box of the same class by more than `iou_threshold`.
pub fn non_maximum_suppression(candidates: &[Candidate], iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len()).collect();
    order.sort_by(|&a, &b| {
        candidates[b]
            .confidence
            .total_cmp(&candidates[a].confidence)
    });

    let mut suppressed = vec![false; candidates.len()];
    let mut keep = Vec::new();

    for (pos, &i) in order.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        for &j in &order[pos + 1..] {
            if suppressed[j] || candidates[i].class_id != candidates[j].class_id {
                continue;
            }
            if candidates[i].bbox.iou(&candidates[j].bbox) > iou_threshold {
                suppressed[j] = true;
            }
        }
    }

    keep.sort_unstable();
    keep
}
