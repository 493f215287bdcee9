//! Depth fusion.
//!
//! Attaches a distance to each detection from the aligned depth map. The
//! distance is the median of the valid depth samples inside the central
//! region of the box. Missing or out-of-range data yields `None`, never a
//! placeholder value.

use lens_models::{BBox, DetectionBatch, Frame};

/// Depth sensor configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthConfig {
    /// Meters per raw depth unit
    pub depth_scale: f32,
    /// Closest valid reading in meters
    pub min_m: f32,
    /// Farthest valid reading in meters
    pub max_m: f32,
    /// Fraction of the box width and height sampled around its center
    pub region_fraction: f32,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            depth_scale: 0.001,
            min_m: 0.1,
            max_m: 10.0,
            region_fraction: 0.5,
        }
    }
}

impl DepthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            depth_scale: std::env::var("LENS_DEPTH_SCALE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.depth_scale),
            min_m: std::env::var("LENS_DEPTH_MIN_M")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.min_m),
            max_m: std::env::var("LENS_DEPTH_MAX_M")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_m),
            region_fraction: std::env::var("LENS_DEPTH_REGION_FRACTION")
                .ok()
                .and_then(|s| s.parse::<f32>().ok())
                .filter(|f| *f > 0.0 && *f <= 1.0)
                .unwrap_or(defaults.region_fraction),
        }
    }
}

/// Pure depth-to-detection fuser.
#[derive(Debug, Clone, Default)]
pub struct DepthFuser {
    config: DepthConfig,
}

impl DepthFuser {
    pub fn new(config: DepthConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DepthConfig {
        &self.config
    }

    /// Attach distances to every detection in `batch`.
    ///
    /// `depth` is row-major with the given dimensions. A short buffer only
    /// reduces the samples available; it never panics.
    pub fn fuse(
        &self,
        mut batch: DetectionBatch,
        depth: &[u16],
        width: u32,
        height: u32,
    ) -> DetectionBatch {
        batch.detections = batch
            .detections
            .into_iter()
            .map(|detection| {
                let distance = self.distance_for(&detection.bbox, depth, width, height);
                detection.with_distance(distance)
            })
            .collect();
        batch
    }

    /// Fuse against the depth map of the frame the batch came from.
    pub fn fuse_frame(&self, batch: DetectionBatch, frame: &Frame) -> DetectionBatch {
        self.fuse(batch, frame.depth(), frame.width(), frame.height())
    }

    /// Median distance in meters over the central region of `bbox`.
    pub fn distance_for(&self, bbox: &BBox, depth: &[u16], width: u32, height: u32) -> Option<f32> {
        if !bbox.is_finite() || width == 0 || height == 0 {
            return None;
        }

        let (x0, x1) = central_span(bbox.x, bbox.width, self.config.region_fraction, width);
        let (y0, y1) = central_span(bbox.y, bbox.height, self.config.region_fraction, height);
        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        let stride = width as usize;
        let mut samples: Vec<f32> = Vec::with_capacity((x1 - x0) * (y1 - y0));
        for y in y0..y1 {
            let row = y * stride;
            for x in x0..x1 {
                let Some(&raw) = depth.get(row + x) else {
                    continue;
                };
                if raw == 0 {
                    continue;
                }
                let meters = raw as f32 * self.config.depth_scale;
                if meters.is_finite() && meters >= self.config.min_m && meters <= self.config.max_m {
                    samples.push(meters);
                }
            }
        }

        median(&mut samples)
    }
}

/// Pixel range `[start, end)` covering the central `fraction` of a span,
/// clamped to `[0, limit]`.
fn central_span(origin: f32, extent: f32, fraction: f32, limit: u32) -> (usize, usize) {
    let (lo, hi) = if extent >= 0.0 {
        (origin, origin + extent)
    } else {
        (origin + extent, origin)
    };
    let margin = (hi - lo) * (1.0 - fraction.clamp(0.0, 1.0)) / 2.0;
    let limit = limit as f32;

    let start = (lo + margin).floor().clamp(0.0, limit);
    let end = (hi - margin).ceil().clamp(0.0, limit);
    (start as usize, end as usize)
}

fn median(samples: &mut [f32]) -> Option<f32> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(|a, b| a.total_cmp(b));
    let mid = samples.len() / 2;
    if samples.len() % 2 == 0 {
        Some((samples[mid - 1] + samples[mid]) / 2.0)
    } else {
        Some(samples[mid])
    }
}
