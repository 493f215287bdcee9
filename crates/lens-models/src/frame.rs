//! Captured color+depth frame.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised when assembling a frame from raw buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Frame has zero area ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    #[error("Color buffer length {actual} does not match {width}x{height}x3 = {expected}")]
    ColorLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Depth buffer length {actual} does not match {width}x{height} = {expected}")]
    DepthLength {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// One synchronized capture: an RGB8 color image and an aligned z16 depth map.
///
/// Frames are immutable once built. Fields are private so a frame handed to
/// the detector is exactly the frame the source produced.
#[derive(Debug, Clone)]
pub struct Frame {
    id: u64,
    timestamp: DateTime<Utc>,
    width: u32,
    height: u32,
    color: Vec<u8>,
    depth: Vec<u16>,
}

impl Frame {
    /// Build a frame, checking that both buffers match the declared dimensions.
    pub fn new(
        id: u64,
        timestamp: DateTime<Utc>,
        width: u32,
        height: u32,
        color: Vec<u8>,
        depth: Vec<u16>,
    ) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::EmptyFrame { width, height });
        }

        let pixels = width as usize * height as usize;
        if color.len() != pixels * 3 {
            return Err(FrameError::ColorLength {
                width,
                height,
                expected: pixels * 3,
                actual: color.len(),
            });
        }
        if depth.len() != pixels {
            return Err(FrameError::DepthLength {
                width,
                height,
                expected: pixels,
                actual: depth.len(),
            });
        }

        Ok(Self {
            id,
            timestamp,
            width,
            height,
            color,
            depth,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major RGB8 pixels.
    pub fn color(&self) -> &[u8] {
        &self.color
    }

    /// Row-major raw depth units; 0 means the sensor returned no data.
    pub fn depth(&self) -> &[u16] {
        &self.depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_accepts_matching_buffers() {
        let frame = Frame::new(7, Utc::now(), 4, 2, vec![0; 24], vec![0; 8]).unwrap();
        assert_eq!(frame.id(), 7);
        assert_eq!(frame.color().len(), 24);
        assert_eq!(frame.depth().len(), 8);
    }

    #[test]
    fn test_frame_rejects_short_color_buffer() {
        let err = Frame::new(1, Utc::now(), 4, 2, vec![0; 23], vec![0; 8]).unwrap_err();
        assert!(matches!(err, FrameError::ColorLength { expected: 24, actual: 23, .. }));
    }

    #[test]
    fn test_frame_rejects_mismatched_depth() {
        let err = Frame::new(1, Utc::now(), 4, 2, vec![0; 24], vec![0; 4]).unwrap_err();
        assert!(matches!(err, FrameError::DepthLength { expected: 8, .. }));
    }

    #[test]
    fn test_frame_rejects_zero_area() {
        let err = Frame::new(1, Utc::now(), 0, 2, vec![], vec![]).unwrap_err();
        assert_eq!(err, FrameError::EmptyFrame { width: 0, height: 2 });
    }
}
