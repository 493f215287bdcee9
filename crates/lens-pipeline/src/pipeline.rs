//! Capture pipeline controller.
//!
//! `start` loads the detector, opens the camera and spawns one capture task
//! that runs FrameSource -> ResultCache/DetectionEngine -> DepthFuser ->
//! EventBus at the configured cadence. `stop` signals the task and waits up
//! to the grace period for the in-flight frame before aborting it. The bus
//! and cache outlive runs so the pipeline can be restarted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use lens_models::Frame;
use lens_vision::{
    frame_key, CameraDriver, DepthConfig, DepthFuser, DetectionEngine, FrameSource, VisionError,
    VisionResult,
};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::cache::ResultCache;
use crate::config::{CacheConfig, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::event_bus::EventBus;
use crate::metrics;

/// Builds a fresh camera driver for each run.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn CameraDriver> + Send + Sync>;

/// Loads the detector for each run.
pub type EngineFactory = Arc<dyn Fn() -> VisionResult<DetectionEngine> + Send + Sync>;

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    pub running: bool,
    /// Set when the camera could not be recovered; cleared by the next start
    pub fatal: bool,
    pub frames_captured: u64,
    pub frames_skipped: u64,
    pub detector_failures: u32,
}

/// State shared between the controller, the capture task and health probes.
#[derive(Default)]
struct Shared {
    running: AtomicBool,
    fatal: AtomicBool,
    heartbeat: Mutex<Option<Instant>>,
    frames_captured: AtomicU64,
    frames_skipped: AtomicU64,
    engine: RwLock<Option<Arc<DetectionEngine>>>,
}

impl Shared {
    fn beat(&self) {
        *self.heartbeat.lock().unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    fn skip(&self, reason: &'static str) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
        metrics::record_frame_skipped(reason);
    }

    fn engine(&self) -> Option<Arc<DetectionEngine>> {
        self.engine
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct RunHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Owner of the capture loop.
pub struct Pipeline {
    config: PipelineConfig,
    bus: EventBus,
    cache: Arc<ResultCache>,
    fuser: DepthFuser,
    driver_factory: DriverFactory,
    engine_factory: EngineFactory,
    shared: Arc<Shared>,
    run: tokio::sync::Mutex<Option<RunHandle>>,
}

impl Pipeline {
    pub fn new<D, E>(config: PipelineConfig, driver_factory: D, engine_factory: E) -> Self
    where
        D: Fn() -> Box<dyn CameraDriver> + Send + Sync + 'static,
        E: Fn() -> VisionResult<DetectionEngine> + Send + Sync + 'static,
    {
        Self {
            bus: EventBus::new(config.queue_depth),
            cache: Arc::new(ResultCache::new(CacheConfig::default())),
            fuser: DepthFuser::default(),
            driver_factory: Arc::new(driver_factory),
            engine_factory: Arc::new(engine_factory),
            shared: Arc::new(Shared::default()),
            run: tokio::sync::Mutex::new(None),
            config,
        }
    }

    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = Arc::new(ResultCache::new(config));
        self
    }

    pub fn with_depth(mut self, config: DepthConfig) -> Self {
        self.fuser = DepthFuser::new(config);
        self
    }

    /// Start capturing.
    ///
    /// Fails with `AlreadyRunning` when a capture task is live, and with the
    /// underlying vision error when the detector or camera cannot be opened.
    pub async fn start(&self) -> PipelineResult<()> {
        let mut run = self.run.lock().await;
        if let Some(handle) = run.as_ref() {
            if !handle.task.is_finished() {
                return Err(PipelineError::AlreadyRunning);
            }
        }
        // A previous run halted on its own.
        if let Some(stale) = run.take() {
            let _ = stale.task.await;
        }

        let factory = Arc::clone(&self.engine_factory);
        let engine = tokio::task::spawn_blocking(move || factory())
            .await
            .map_err(|e| VisionError::internal(format!("detector load task failed: {}", e)))??;
        let engine = Arc::new(engine);

        let mut source = FrameSource::new((self.driver_factory)());
        source.open().await?;
        let driver = source.driver_name().to_string();

        *self
            .shared
            .engine
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&engine));
        self.shared.fatal.store(false, Ordering::SeqCst);
        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.beat();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = CaptureLoop {
            config: self.config.clone(),
            bus: self.bus.clone(),
            cache: Arc::clone(&self.cache),
            fuser: self.fuser.clone(),
            shared: Arc::clone(&self.shared),
            engine,
        };
        let task = tokio::spawn(worker.run(source, shutdown_rx));
        *run = Some(RunHandle { shutdown, task });

        info!(
            driver = %driver,
            target_fps = self.config.target_fps,
            "Pipeline started"
        );
        Ok(())
    }

    /// Stop capturing and release the camera.
    pub async fn stop(&self) -> PipelineResult<()> {
        let mut run = self.run.lock().await;
        let Some(mut handle) = run.take() else {
            return Err(PipelineError::NotRunning);
        };
        if handle.task.is_finished() {
            let _ = handle.task.await;
            return Err(PipelineError::NotRunning);
        }

        let _ = handle.shutdown.send(true);
        match tokio::time::timeout(self.config.stop_grace, &mut handle.task).await {
            Ok(Ok(())) => info!("Pipeline stopped"),
            Ok(Err(e)) => warn!(error = %e, "Capture task ended abnormally"),
            Err(_) => {
                warn!(
                    grace_ms = self.config.stop_grace.as_millis() as u64,
                    "Capture loop did not stop within grace period, aborting"
                );
                handle.task.abort();
                if let Err(e) = handle.task.await {
                    if !e.is_cancelled() {
                        return Err(PipelineError::shutdown(e.to_string()));
                    }
                }
            }
        }

        self.shared.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Stop if running and close the bus. Used on process exit.
    pub async fn shutdown(&self) {
        match self.stop().await {
            Ok(()) | Err(PipelineError::NotRunning) => {}
            Err(e) => warn!(error = %e, "Pipeline shutdown failed"),
        }
        self.bus.close();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// True when the camera could not be recovered.
    pub fn is_fatal(&self) -> bool {
        self.shared.fatal.load(Ordering::SeqCst)
    }

    /// Capture liveness: not fatal and, while running, a recent heartbeat.
    pub fn capture_live(&self) -> bool {
        if self.is_fatal() {
            return false;
        }
        if !self.is_running() {
            return true;
        }
        self.shared
            .heartbeat
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .map_or(false, |at| at.elapsed() <= self.config.stale_after)
    }

    /// Detector liveness; true before the first start.
    pub fn detector_live(&self) -> bool {
        self.shared.engine().map_or(true, |engine| engine.is_live())
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.is_running(),
            fatal: self.is_fatal(),
            frames_captured: self.shared.frames_captured.load(Ordering::Relaxed),
            frames_skipped: self.shared.frames_skipped.load(Ordering::Relaxed),
            detector_failures: self
                .shared
                .engine()
                .map_or(0, |engine| engine.consecutive_failures()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

/// Everything the capture task needs for one run.
struct CaptureLoop {
    config: PipelineConfig,
    bus: EventBus,
    cache: Arc<ResultCache>,
    fuser: DepthFuser,
    shared: Arc<Shared>,
    engine: Arc<DetectionEngine>,
}

impl CaptureLoop {
    async fn run(self, mut source: FrameSource, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.frame_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }

            match source.acquire(self.config.acquire_timeout).await {
                Ok(frame) => self.process(frame).await,
                Err(VisionError::AcquisitionTimeout(timeout)) => {
                    self.shared.skip("timeout");
                    debug!(timeout_ms = timeout.as_millis() as u64, "No frame within timeout");
                }
                Err(e) => {
                    self.shared.skip("disconnect");
                    warn!(error = %e, "Camera failed, reconnecting");

                    let reconnected = tokio::select! {
                        biased;
                        _ = shutdown.changed() => break,
                        result = source.reconnect(&self.config.backoff) => result,
                    };
                    match reconnected {
                        Ok(()) => self.shared.beat(),
                        Err(e) => {
                            error!(error = %e, "Camera could not be recovered, halting pipeline");
                            self.shared.fatal.store(true, Ordering::SeqCst);
                            break;
                        }
                    }
                }
            }
        }

        source.close().await;
        self.shared.running.store(false, Ordering::SeqCst);
        info!("Capture loop finished");
    }

    async fn process(&self, frame: Frame) {
        self.shared.beat();
        self.shared.frames_captured.fetch_add(1, Ordering::Relaxed);
        metrics::record_frame_captured();

        let frame = Arc::new(frame);
        let frame_id = frame.id();

        let hashed = Arc::clone(&frame);
        let key = match tokio::task::spawn_blocking(move || frame_key(&hashed)).await {
            Ok(key) => key,
            Err(e) => {
                self.shared.skip("fingerprint");
                warn!(frame_id, error = %e, "Frame fingerprint failed");
                return;
            }
        };

        let engine = Arc::clone(&self.engine);
        let detect_frame = Arc::clone(&frame);
        let result = self
            .cache
            .get_or_compute(key, move || async move {
                tokio::task::spawn_blocking(move || engine.detect(&detect_frame))
                    .await
                    .map_err(|e| VisionError::internal(format!("inference task failed: {}", e)))?
            })
            .await;

        match result {
            Ok(cached) => {
                let batch = cached.restamp(frame_id, frame.timestamp());
                let batch = self.fuser.fuse_frame(batch, &frame);
                let count = batch.len();
                self.bus.publish(batch);
                debug!(frame_id, count, key = %key, "Published detections");
            }
            Err(e) => {
                self.shared.skip("inference");
                warn!(
                    frame_id,
                    consecutive_failures = self.engine.consecutive_failures(),
                    error = %e,
                    "Frame skipped"
                );
            }
        }
    }
}
