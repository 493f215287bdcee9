//! Perceptual frame fingerprint.
//!
//! A 64-bit difference hash: the color image is reduced to a 9x8 grayscale
//! thumbnail and each bit records whether a pixel is brighter than its right
//! neighbour. Identical frames always share a key; frames that differ only by
//! sensor noise almost always do.

use std::fmt;

use image::{imageops::FilterType, DynamicImage, ImageBuffer, Rgb};
use lens_models::Frame;
use serde::Serialize;

const HASH_WIDTH: u32 = 9;
const HASH_HEIGHT: u32 = 8;

/// Cache key for a frame: the difference hash plus the frame dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FrameKey {
    pub hash: u64,
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for FrameKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}@{}x{}", self.hash, self.width, self.height)
    }
}

/// Compute the fingerprint of a frame's color buffer.
pub fn frame_key(frame: &Frame) -> FrameKey {
    FrameKey {
        hash: dhash(frame.color(), frame.width(), frame.height()),
        width: frame.width(),
        height: frame.height(),
    }
}

fn dhash(color: &[u8], width: u32, height: u32) -> u64 {
    let Some(buffer) = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, color.to_vec()) else {
        return 0;
    };

    let thumb = DynamicImage::ImageRgb8(buffer)
        .resize_exact(HASH_WIDTH, HASH_HEIGHT, FilterType::Triangle)
        .to_luma8();

    let mut hash = 0u64;
    for y in 0..HASH_HEIGHT {
        for x in 0..HASH_WIDTH - 1 {
            let left = thumb.get_pixel(x, y)[0];
            let right = thumb.get_pixel(x + 1, y)[0];
            hash = (hash << 1) | u64::from(left > right);
        }
    }
    hash
}
