//! Frame to model-input conversion.

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb};
use lens_models::Frame;

use super::config::Normalization;
use crate::error::{VisionError, VisionResult};

/// NCHW float tensor ready for inference, shape `[1, 3, height, width]`.
#[derive(Debug, Clone)]
pub struct PreprocessedInput {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl PreprocessedInput {
    pub fn shape(&self) -> [usize; 4] {
        [1, 3, self.height as usize, self.width as usize]
    }
}

/// Resize the color image to `(width, height)` and normalize into NCHW.
pub fn preprocess(
    frame: &Frame,
    (width, height): (u32, u32),
    norm: Normalization,
) -> VisionResult<PreprocessedInput> {
    let buffer: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(frame.width(), frame.height(), frame.color().to_vec())
            .ok_or_else(|| VisionError::internal("Failed to create image buffer"))?;

    let resized = DynamicImage::ImageRgb8(buffer)
        .resize_exact(width, height, FilterType::Triangle)
        .to_rgb8();

    let (w, h) = (width as usize, height as usize);
    let plane = w * h;
    let mut data = vec![0.0f32; 3 * plane];

    // HWC -> CHW
    for (i, pixel) in resized.pixels().enumerate() {
        for c in 0..3 {
            let src = if norm.bgr { 2 - c } else { c };
            data[c * plane + i] = (pixel[src] as f32 - norm.mean) * norm.scale;
        }
    }

    Ok(PreprocessedInput {
        width,
        height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn solid_frame(rgb: [u8; 3]) -> Frame {
        let color = rgb.iter().copied().cycle().take(4 * 4 * 3).collect();
        Frame::new(1, Utc::now(), 4, 4, color, vec![0; 16]).unwrap()
    }

    #[test]
    fn test_rgb_scaled_to_unit_range() {
        let norm = Normalization {
            scale: 1.0 / 255.0,
            mean: 0.0,
            bgr: false,
        };
        let input = preprocess(&solid_frame([255, 0, 51]), (2, 2), norm).unwrap();
        assert_eq!(input.shape(), [1, 3, 2, 2]);
        assert_eq!(input.data.len(), 12);
        assert!((input.data[0] - 1.0).abs() < 1e-5);
        assert!(input.data[4].abs() < 1e-5);
        assert!((input.data[8] - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_bgr_swaps_channels_and_centers() {
        let norm = Normalization {
            scale: 0.007843,
            mean: 127.5,
            bgr: true,
        };
        let input = preprocess(&solid_frame([255, 127, 0]), (2, 2), norm).unwrap();
        // Channel 0 is blue, channel 2 is red.
        assert!((input.data[0] + 1.0).abs() < 1e-3);
        assert!((input.data[8] - 1.0).abs() < 1e-3);
    }
}
