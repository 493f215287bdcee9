//! Camera driver seam.
//!
//! The driver itself (RealSense SDK, V4L2 bridge, file replay) lives outside
//! this crate. The pipeline only needs `open`, `read` and `close`.

use thiserror::Error;

/// One synchronized color+depth read straight from the driver.
#[derive(Debug, Clone)]
pub struct RawCapture {
    pub width: u32,
    pub height: u32,
    /// Row-major RGB8
    pub color: Vec<u8>,
    /// Row-major z16, aligned to the color image
    pub depth: Vec<u16>,
}

/// Errors reported by a camera driver.
#[derive(Debug, Clone, Error)]
pub enum DriverError {
    #[error("Device unavailable: {0}")]
    Unavailable(String),

    #[error("Device disconnected: {0}")]
    Disconnected(String),

    #[error("Read failed: {0}")]
    Read(String),
}

/// A camera device that can be opened repeatedly.
pub trait CameraDriver: Send + 'static {
    /// Driver identifier for logs.
    fn name(&self) -> &str;

    /// Open the device and start streaming.
    fn open(&mut self) -> Result<Box<dyn CameraHandle>, DriverError>;
}

/// An open device stream.
pub trait CameraHandle: Send {
    /// Block until the next synchronized pair is available.
    fn read(&mut self) -> Result<RawCapture, DriverError>;

    /// Stop streaming and release the device.
    fn close(self: Box<Self>);
}
