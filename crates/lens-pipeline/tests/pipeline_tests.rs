//! Pipeline integration tests against the synthetic camera and a fake model.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use lens_pipeline::{HealthMonitor, Pipeline, PipelineConfig, PipelineError};
use lens_vision::{
    BackoffPolicy, CameraDriver, CameraHandle, DetectionEngine, DetectorConfig, DriverError,
    InferenceModel, ModelVariant, PreprocessedInput, RawCapture, RawOutput, SyntheticCamera,
    VisionError, VisionResult,
};

/// Always reports one person in the bottom-right quadrant.
struct FixedModel;

impl InferenceModel for FixedModel {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn infer(&mut self, _input: &PreprocessedInput) -> VisionResult<RawOutput> {
        Ok(RawOutput::new(
            vec![1, 1, 1, 7],
            vec![0.0, 15.0, 0.9, 0.75, 0.75, 1.0, 1.0],
        ))
    }
}

struct BrokenModel;

impl InferenceModel for BrokenModel {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn infer(&mut self, _input: &PreprocessedInput) -> VisionResult<RawOutput> {
        Err(VisionError::inference("device lost"))
    }
}

fn camera() -> Box<dyn CameraDriver> {
    Box::new(SyntheticCamera {
        width: 64,
        height: 48,
        fps: 100,
        ..Default::default()
    })
}

fn engine(model: Box<dyn InferenceModel>) -> VisionResult<DetectionEngine> {
    DetectionEngine::with_model(DetectorConfig::for_variant(ModelVariant::MobileNetSsd), model)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        target_fps: 50,
        acquire_timeout: Duration::from_millis(200),
        backoff: BackoffPolicy {
            base: Duration::from_millis(5),
            cap: Duration::from_millis(20),
            max_attempts: 2,
        },
        stop_grace: Duration::from_secs(1),
        ..Default::default()
    }
}

fn working_pipeline() -> Arc<Pipeline> {
    Arc::new(Pipeline::new(config(), camera, || engine(Box::new(FixedModel))))
}

/// Opens once, fails the first read, then refuses to reopen.
struct DyingDriver {
    opens: Arc<AtomicU32>,
}

struct DyingHandle;

impl CameraHandle for DyingHandle {
    fn read(&mut self) -> Result<RawCapture, DriverError> {
        std::thread::sleep(Duration::from_millis(10));
        Err(DriverError::Disconnected("usb reset".to_string()))
    }

    fn close(self: Box<Self>) {}
}

impl CameraDriver for DyingDriver {
    fn name(&self) -> &str {
        "dying"
    }

    fn open(&mut self) -> Result<Box<dyn CameraHandle>, DriverError> {
        if self.opens.fetch_add(1, Ordering::SeqCst) == 0 {
            Ok(Box::new(DyingHandle))
        } else {
            Err(DriverError::Unavailable("no device".to_string()))
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_publishes_fused_detections() {
    let pipeline = working_pipeline();
    let (_handle, stream) = pipeline.bus().subscribe_stream("test");
    let mut stream = Box::pin(stream);

    pipeline.start().await.unwrap();
    assert!(pipeline.is_running());

    let first = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .unwrap()
        .unwrap();

    assert!(second.frame_id > first.frame_id);
    assert_eq!(first.detections.len(), 1);
    let person = &first.detections[0];
    assert_eq!(person.class_label, "person");
    let distance = person.distance_m.unwrap();
    assert!((distance - 3.0).abs() < 0.01, "distance was {}", distance);

    pipeline.stop().await.unwrap();
    assert!(!pipeline.is_running());
    assert!(pipeline.status().frames_captured >= 2);
}

#[tokio::test]
async fn test_start_and_stop_are_guarded() {
    let pipeline = working_pipeline();

    assert!(matches!(pipeline.stop().await, Err(PipelineError::NotRunning)));

    pipeline.start().await.unwrap();
    assert!(matches!(pipeline.start().await, Err(PipelineError::AlreadyRunning)));

    pipeline.stop().await.unwrap();
    assert!(matches!(pipeline.stop().await, Err(PipelineError::NotRunning)));

    // Restart on the same bus.
    pipeline.start().await.unwrap();
    wait_until(|| pipeline.bus().latest().is_some()).await;
    pipeline.stop().await.unwrap();
    assert!(!pipeline.bus().is_closed());
}

#[tokio::test]
async fn test_missing_model_reported_on_start() {
    let pipeline = Pipeline::new(config(), camera, || {
        let mut detector = DetectorConfig::for_variant(ModelVariant::YoloV8);
        detector.files.topology = "/nonexistent/model.onnx".to_string();
        DetectionEngine::new(detector)
    });

    let err = pipeline.start().await.unwrap_err();
    assert!(matches!(err, PipelineError::Vision(VisionError::ModelNotFound(_))));
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn test_unrecoverable_camera_is_fatal() {
    let opens = Arc::new(AtomicU32::new(0));
    let driver_opens = Arc::clone(&opens);
    let pipeline = Arc::new(Pipeline::new(
        config(),
        move || -> Box<dyn CameraDriver> {
            Box::new(DyingDriver {
                opens: Arc::clone(&driver_opens),
            })
        },
        || engine(Box::new(FixedModel)),
    ));
    let monitor = HealthMonitor::for_pipeline(&pipeline, None);

    pipeline.start().await.unwrap();
    wait_until(|| pipeline.is_fatal()).await;
    wait_until(|| !pipeline.is_running()).await;

    // Initial open plus one per reconnect attempt.
    assert_eq!(opens.load(Ordering::SeqCst), 3);
    let status = monitor.poll();
    assert!(!status.healthy);
    assert_eq!(status.is_live("capture"), Some(false));
    assert!(matches!(pipeline.stop().await, Err(PipelineError::NotRunning)));
}

#[tokio::test]
async fn test_repeated_inference_failures_mark_detector_dead() {
    let pipeline = Arc::new(Pipeline::new(config(), camera, || {
        engine(Box::new(BrokenModel))
    }));
    let monitor = HealthMonitor::for_pipeline(&pipeline, None);
    assert!(monitor.poll().healthy);

    pipeline.start().await.unwrap();
    wait_until(|| !pipeline.detector_live()).await;

    let status = monitor.poll();
    assert!(!status.healthy);
    assert_eq!(status.is_live("detector"), Some(false));
    assert_eq!(status.is_live("capture"), Some(true));
    assert!(pipeline.bus().latest().is_none());
    assert!(pipeline.status().frames_skipped >= 3);

    pipeline.stop().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_bus() {
    let pipeline = working_pipeline();
    pipeline.start().await.unwrap();
    pipeline.shutdown().await;

    assert!(!pipeline.is_running());
    assert!(pipeline.bus().is_closed());
}
