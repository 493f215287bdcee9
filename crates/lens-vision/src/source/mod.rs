//! Frame acquisition.
//!
//! `FrameSource` owns the camera driver. `open` starts a dedicated reader
//! thread that pulls synchronized pairs from the driver into a single-slot
//! mailbox (newest wins). `acquire` takes from the mailbox with a timeout, so
//! every capture is handed out at most once and never re-served.
//!
//! A driver error closes the stream: the error is surfaced once from
//! `acquire`, and the caller decides whether to `reconnect`.

mod backoff;
mod driver;
mod synthetic;

pub use backoff::BackoffPolicy;
pub use driver::{CameraDriver, CameraHandle, DriverError, RawCapture};
pub use synthetic::SyntheticCamera;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use lens_models::Frame;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::error::{VisionError, VisionResult};

type Delivery = Result<RawCapture, DriverError>;

/// Single-slot handoff between the reader thread and `acquire`.
struct Mailbox {
    slot: Mutex<Option<Delivery>>,
    notify: Notify,
    alive: AtomicBool,
    stop: AtomicBool,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
            alive: AtomicBool::new(true),
            stop: AtomicBool::new(false),
        }
    }

    fn put(&self, delivery: Delivery) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        // An undelivered error must not be overwritten by a later frame.
        if !matches!(*slot, Some(Err(_))) {
            *slot = Some(delivery);
        }
        drop(slot);
        self.notify.notify_one();
    }

    fn take(&self) -> Option<Delivery> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn finish(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.notify.notify_one();
    }
}

struct Reader {
    mailbox: Arc<Mailbox>,
    thread: Option<JoinHandle<()>>,
}

/// Owned camera resource handle.
///
/// Not a global: the pipeline creates one, opens it on start and closes it on
/// stop. Dropping an open source signals its reader thread to release the
/// device.
pub struct FrameSource {
    driver: Arc<Mutex<Box<dyn CameraDriver>>>,
    driver_name: String,
    reader: Option<Reader>,
    next_id: u64,
}

impl FrameSource {
    pub fn new(driver: Box<dyn CameraDriver>) -> Self {
        let driver_name = driver.name().to_string();
        Self {
            driver: Arc::new(Mutex::new(driver)),
            driver_name,
            reader: None,
            next_id: 1,
        }
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    /// Open the device and start the reader thread.
    pub async fn open(&mut self) -> VisionResult<()> {
        if self.reader.is_some() {
            return Ok(());
        }

        let driver = Arc::clone(&self.driver);
        let handle = tokio::task::spawn_blocking(move || {
            let mut driver = driver.lock().unwrap_or_else(PoisonError::into_inner);
            driver.open()
        })
        .await
        .map_err(|e| VisionError::internal(format!("driver open task failed: {}", e)))?
        .map_err(|e| VisionError::acquisition(e.to_string()))?;

        let mailbox = Arc::new(Mailbox::new());
        let thread_mailbox = Arc::clone(&mailbox);
        let thread = std::thread::Builder::new()
            .name("lens-capture".into())
            .spawn(move || read_loop(handle, thread_mailbox))
            .map_err(|e| VisionError::internal(format!("failed to spawn capture thread: {}", e)))?;

        info!(driver = %self.driver_name, "Frame source opened");
        self.reader = Some(Reader {
            mailbox,
            thread: Some(thread),
        });
        Ok(())
    }

    /// Wait up to `timeout` for the next frame.
    ///
    /// Fails with `AcquisitionTimeout` when nothing arrives in time and with
    /// `Acquisition` when the device reported an error or the stream ended.
    /// After an `Acquisition` error the source is closed.
    pub async fn acquire(&mut self, timeout: Duration) -> VisionResult<Frame> {
        let mailbox = match &self.reader {
            Some(reader) => Arc::clone(&reader.mailbox),
            None => return Err(VisionError::acquisition("frame source is not open")),
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let Some(delivery) = mailbox.take() {
                return match delivery {
                    Ok(capture) => self.build_frame(capture),
                    Err(err) => {
                        warn!(driver = %self.driver_name, error = %err, "Camera stream failed");
                        self.close().await;
                        Err(VisionError::acquisition(err.to_string()))
                    }
                };
            }

            if !mailbox.alive.load(Ordering::SeqCst) {
                self.close().await;
                return Err(VisionError::acquisition("capture stream ended"));
            }

            if tokio::time::timeout_at(deadline, mailbox.notify.notified())
                .await
                .is_err()
            {
                return Err(VisionError::AcquisitionTimeout(timeout));
            }
        }
    }

    /// Close and reopen the device following `policy`.
    ///
    /// Returns the last error once all attempts are used up.
    pub async fn reconnect(&mut self, policy: &BackoffPolicy) -> VisionResult<()> {
        self.close().await;

        let mut last_error = None;
        for (attempt, delay) in policy.delays().enumerate() {
            tokio::time::sleep(delay).await;
            match self.open().await {
                Ok(()) => {
                    info!(
                        driver = %self.driver_name,
                        attempt = attempt + 1,
                        "Camera reconnected"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        driver = %self.driver_name,
                        attempt = attempt + 1,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "Camera reconnect failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(VisionError::acquisition(format!(
            "reconnect gave up after {} attempts: {}",
            policy.max_attempts,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts configured".to_string())
        )))
    }

    /// Stop the reader thread and release the device.
    pub async fn close(&mut self) {
        let Some(mut reader) = self.reader.take() else {
            return;
        };
        reader.mailbox.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = reader.thread.take() {
            if tokio::task::spawn_blocking(move || thread.join()).await.is_err() {
                warn!(driver = %self.driver_name, "Capture thread join failed");
            }
        }
        debug!(driver = %self.driver_name, "Frame source closed");
    }

    fn build_frame(&mut self, capture: RawCapture) -> VisionResult<Frame> {
        let frame = Frame::new(
            self.next_id,
            Utc::now(),
            capture.width,
            capture.height,
            capture.color,
            capture.depth,
        )
        .map_err(|e| VisionError::acquisition(format!("malformed capture: {}", e)))?;
        self.next_id += 1;
        Ok(frame)
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        if let Some(reader) = &self.reader {
            reader.mailbox.stop.store(true, Ordering::SeqCst);
        }
    }
}

fn read_loop(mut handle: Box<dyn CameraHandle>, mailbox: Arc<Mailbox>) {
    while !mailbox.stop.load(Ordering::SeqCst) {
        match handle.read() {
            Ok(capture) => mailbox.put(Ok(capture)),
            Err(err) => {
                mailbox.put(Err(err));
                break;
            }
        }
    }
    handle.close();
    mailbox.finish();
}
