//! Deterministic synthetic RGB-D camera.
//!
//! Produces a gradient background with a bright square drifting across it.
//! The depth map places the background at `background_m` and the square at
//! `object_m`. The leftmost `invalid_columns` columns carry no depth data,
//! like the shadow band of a stereo sensor.

use std::thread;
use std::time::Duration;

use super::driver::{CameraDriver, CameraHandle, DriverError, RawCapture};

/// Synthetic camera configuration.
#[derive(Debug, Clone)]
pub struct SyntheticCamera {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub background_m: f32,
    pub object_m: f32,
    pub depth_scale: f32,
    pub invalid_columns: u32,
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            background_m: 3.0,
            object_m: 1.2,
            depth_scale: 0.001,
            invalid_columns: 16,
        }
    }
}

impl SyntheticCamera {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            width: std::env::var("LENS_CAMERA_WIDTH")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.width),
            height: std::env::var("LENS_CAMERA_HEIGHT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.height),
            fps: std::env::var("LENS_CAMERA_FPS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.fps),
            ..defaults
        }
    }
}

impl CameraDriver for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn open(&mut self) -> Result<Box<dyn CameraHandle>, DriverError> {
        if self.width == 0 || self.height == 0 {
            return Err(DriverError::Unavailable(format!(
                "invalid synthetic resolution {}x{}",
                self.width, self.height
            )));
        }
        Ok(Box::new(SyntheticStream {
            config: self.clone(),
            tick: 0,
        }))
    }
}

struct SyntheticStream {
    config: SyntheticCamera,
    tick: u64,
}

impl SyntheticStream {
    fn render(&self) -> RawCapture {
        let SyntheticCamera {
            width,
            height,
            background_m,
            object_m,
            depth_scale,
            invalid_columns,
            ..
        } = self.config;

        let w = width as usize;
        let h = height as usize;
        let side = (w.min(h) / 4).max(1);
        let travel = w.saturating_sub(side).max(1);
        let left = (self.tick as usize * 4) % travel;
        let top = h.saturating_sub(side) / 2;

        let background_raw = (background_m / depth_scale).round() as u16;
        let object_raw = (object_m / depth_scale).round() as u16;

        let mut color = Vec::with_capacity(w * h * 3);
        let mut depth = Vec::with_capacity(w * h);

        for y in 0..h {
            for x in 0..w {
                let inside = x >= left && x < left + side && y >= top && y < top + side;
                if inside {
                    color.extend_from_slice(&[230, 40, 40]);
                    depth.push(object_raw);
                } else {
                    let shade = ((x * 255) / w.max(1)) as u8;
                    color.extend_from_slice(&[shade, shade / 2, 255 - shade]);
                    depth.push(if (x as u32) < invalid_columns { 0 } else { background_raw });
                }
            }
        }

        RawCapture {
            width,
            height,
            color,
            depth,
        }
    }
}

impl CameraHandle for SyntheticStream {
    fn read(&mut self) -> Result<RawCapture, DriverError> {
        if self.config.fps > 0 {
            thread::sleep(Duration::from_secs_f64(1.0 / self.config.fps as f64));
        }
        let capture = self.render();
        self.tick = self.tick.wrapping_add(1);
        Ok(capture)
    }

    fn close(self: Box<Self>) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> SyntheticCamera {
        SyntheticCamera {
            width: 64,
            height: 48,
            fps: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_buffers_match_resolution() {
        let mut handle = camera().open().unwrap();
        let capture = handle.read().unwrap();
        assert_eq!(capture.color.len(), 64 * 48 * 3);
        assert_eq!(capture.depth.len(), 64 * 48);
        handle.close();
    }

    #[test]
    fn test_invalid_columns_have_no_depth() {
        let mut handle = camera().open().unwrap();
        let capture = handle.read().unwrap();
        // Row 0 is above the square, so only the shadow band is empty.
        assert_eq!(capture.depth[0], 0);
        assert_eq!(capture.depth[20], 3000);
    }

    #[test]
    fn test_rejects_zero_resolution() {
        let mut cam = SyntheticCamera {
            width: 0,
            ..Default::default()
        };
        assert!(cam.open().is_err());
    }
}
