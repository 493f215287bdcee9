//! Per-class detection summaries.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::detection::DetectionBatch;

/// Count and mean distance for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassSummary {
    #[serde(rename = "class")]
    pub class_label: String,
    pub count: usize,
    /// Mean over detections with a known distance; `None` if there are none
    pub average_distance_m: Option<f32>,
}

/// Summary of a batch, grouped by class in first-seen order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DetectionSummary {
    pub total_objects: usize,
    pub objects: Vec<ClassSummary>,
    pub frame_id: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl DetectionSummary {
    /// Summary with no objects, used before the first batch is published.
    pub fn empty() -> Self {
        Self {
            total_objects: 0,
            objects: Vec::new(),
            frame_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn from_batch(batch: &DetectionBatch) -> Self {
        // (label, count, distance sum, distance samples)
        let mut groups: Vec<(String, usize, f32, usize)> = Vec::new();

        for detection in &batch.detections {
            let idx = match groups.iter().position(|g| g.0 == detection.class_label) {
                Some(idx) => idx,
                None => {
                    groups.push((detection.class_label.clone(), 0, 0.0, 0));
                    groups.len() - 1
                }
            };
            let group = &mut groups[idx];
            group.1 += 1;
            if let Some(distance) = detection.distance_m {
                group.2 += distance;
                group.3 += 1;
            }
        }

        let objects = groups
            .into_iter()
            .map(|(class_label, count, sum, samples)| ClassSummary {
                class_label,
                count,
                average_distance_m: (samples > 0).then(|| sum / samples as f32),
            })
            .collect();

        Self {
            total_objects: batch.detections.len(),
            objects,
            frame_id: Some(batch.frame_id),
            timestamp: batch.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BBox, Detection};

    fn detection(label: &str, distance: Option<f32>) -> Detection {
        Detection::new(label, 0.9, BBox::new(0.0, 0.0, 4.0, 4.0))
            .unwrap()
            .with_distance(distance)
    }

    #[test]
    fn test_summary_groups_in_first_seen_order() {
        let batch = DetectionBatch::new(
            3,
            Utc::now(),
            vec![
                detection("person", Some(1.0)),
                detection("chair", None),
                detection("person", Some(3.0)),
                detection("person", None),
            ],
        );

        let summary = batch.summary();
        assert_eq!(summary.total_objects, 4);
        assert_eq!(summary.frame_id, Some(3));
        assert_eq!(summary.objects[0].class_label, "person");
        assert_eq!(summary.objects[0].count, 3);
        assert_eq!(summary.objects[0].average_distance_m, Some(2.0));
        assert_eq!(summary.objects[1].class_label, "chair");
        assert_eq!(summary.objects[1].average_distance_m, None);
    }

    #[test]
    fn test_empty_summary() {
        let summary = DetectionSummary::empty();
        assert_eq!(summary.total_objects, 0);
        assert!(summary.objects.is_empty());
    }
}
