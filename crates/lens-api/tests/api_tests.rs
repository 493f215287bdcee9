//! API integration tests.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use lens_api::{create_router, ApiConfig, AppState};
use lens_enrich::{BreakerConfig, EnrichmentClient, EnrichmentConfig};
use lens_models::DetectionBatch;
use lens_pipeline::{Pipeline, PipelineConfig};
use lens_vision::{
    CameraDriver, DetectionEngine, DetectorConfig, InferenceModel, ModelVariant,
    PreprocessedInput, RawOutput, SyntheticCamera, VisionResult,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// One person at 0.9 and one chair at 0.55.
struct FixedModel;

impl InferenceModel for FixedModel {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn infer(&mut self, _input: &PreprocessedInput) -> VisionResult<RawOutput> {
        Ok(RawOutput::new(
            vec![1, 1, 2, 7],
            vec![
                0.0, 15.0, 0.90, 0.75, 0.75, 1.00, 1.00, // person
                0.0, 9.0, 0.55, 0.30, 0.00, 0.50, 0.20, // chair
            ],
        ))
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

fn pipeline() -> Arc<Pipeline> {
    let config = PipelineConfig {
        target_fps: 50,
        acquire_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    Arc::new(Pipeline::new(config, camera, || {
        DetectionEngine::with_model(
            DetectorConfig::for_variant(ModelVariant::MobileNetSsd),
            Box::new(FixedModel),
        )
    }))
}

fn enrichment(base_url: &str) -> Arc<EnrichmentClient> {
    Arc::new(
        EnrichmentClient::new(EnrichmentConfig {
            base_url: base_url.to_string(),
            timeout: Duration::from_millis(500),
            breaker: BreakerConfig {
                failure_threshold: 2,
                recovery_timeout: Duration::from_secs(30),
            },
            ..Default::default()
        })
        .unwrap(),
    )
}

fn create_test_router(enrichment: Option<Arc<EnrichmentClient>>) -> (Router, AppState) {
    let state = AppState::new(ApiConfig::default(), pipeline(), enrichment);
    (create_router(state.clone(), None), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn wait_for_batch(state: &AppState) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.latest().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("no batch published");
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = create_test_router(None);

    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert_eq!(body["running"], false);
    assert_eq!(body["components"]["capture"]["live"], true);
    assert_eq!(body["components"]["event_bus"]["live"], true);
    assert!(body["components"].get("enrichment").is_none());
}

#[tokio::test]
async fn test_health_reports_503_when_required_component_down() {
    let (app, state) = create_test_router(None);
    state.pipeline.bus().close();

    let (status, body) = send(&app, "GET", "/health", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["healthy"], false);
    assert_eq!(body["components"]["event_bus"]["live"], false);
}

#[tokio::test]
async fn test_reads_before_first_batch_are_empty() {
    let (app, _) = create_test_router(None);

    let (status, body) = send(&app, "GET", "/detections", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
    assert_eq!(body["frame_id"], Value::Null);

    let (_, body) = send(&app, "GET", "/summary", None).await;
    assert_eq!(body["total_objects"], 0);

    let (_, body) = send(&app, "GET", "/query?class=person", None).await;
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn test_start_query_stop_lifecycle() {
    let (app, state) = create_test_router(None);

    let (status, body) = send(&app, "POST", "/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "started");

    let (_, body) = send(&app, "POST", "/start", None).await;
    assert_eq!(body["status"], "already_running");

    wait_for_batch(&state).await;

    let (_, body) = send(&app, "GET", "/detections", None).await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["detections"][0]["class_label"], "person");
    assert!(body["frame_id"].as_u64().unwrap() >= 1);

    let (_, body) = send(&app, "GET", "/summary", None).await;
    assert_eq!(body["total_objects"], 2);
    assert_eq!(body["objects"][0]["class"], "person");

    let (_, body) = send(&app, "GET", "/query?class=person&min_confidence=0.6", None).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["query"]["class"], "person");

    // Default min_confidence of 0.5 keeps the chair
    let (_, body) = send(&app, "GET", "/query?class=chair", None).await;
    assert_eq!(body["count"], 1);

    let (_, body) = send(&app, "GET", "/query?min_confidence=0.6&max_distance=10", None).await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["results"][0]["class_label"], "person");

    let (status, _) = send(&app, "GET", "/query?min_confidence=1.5", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, "POST", "/stop", None).await;
    assert_eq!(body["status"], "stopped");

    let (_, body) = send(&app, "POST", "/stop", None).await;
    assert_eq!(body["status"], "not_running");
}

#[tokio::test]
async fn test_start_without_model_is_descriptive_error() {
    let pipeline = Arc::new(Pipeline::new(PipelineConfig::default(), camera, || {
        let mut config = DetectorConfig::for_variant(ModelVariant::YoloV8);
        config.files.topology = "/nonexistent/yolov8n.onnx".to_string();
        DetectionEngine::new(config)
    }));
    let state = AppState::new(ApiConfig::default(), pipeline, None);
    let app = create_router(state, None);

    let (status, body) = send(&app, "POST", "/start", None).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "detector_unavailable");
    assert!(body["detail"].as_str().unwrap().contains("yolov8n.onnx"));
}

#[tokio::test]
async fn test_stream_emits_batches_until_bus_closes() {
    let (app, state) = create_test_router(None);

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/stream").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("content-type").unwrap(),
        "text/event-stream"
    );

    let bus = state.pipeline.bus();
    bus.publish(DetectionBatch::empty(1, Utc::now()));
    bus.publish(DetectionBatch::empty(2, Utc::now()));
    bus.close();

    let bytes = tokio::time::timeout(
        Duration::from_secs(5),
        axum::body::to_bytes(response.into_body(), usize::MAX),
    )
    .await
    .unwrap()
    .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();

    let ids: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("id:"))
        .map(str::trim)
        .collect();
    assert_eq!(ids, vec!["1", "2"]);

    let frames: Vec<u64> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| serde_json::from_str::<Value>(data.trim()).unwrap())
        .map(|batch| batch["frame_id"].as_u64().unwrap())
        .collect();
    assert_eq!(frames, vec![1, 2]);
}

#[tokio::test]
async fn test_enrich_validation_and_disabled() {
    let (app, _) = create_test_router(None);

    let (status, _) = send(&app, "POST", "/enrich", Some(json!({"prompt": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/enrich", Some(json!({"prompt": "hi"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["detail"].as_str().unwrap().contains("disabled"));
}

#[tokio::test]
async fn test_enrich_with_explicit_context() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"response": "A person is nearby."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (app, _) = create_test_router(Some(enrichment(&server.uri())));

    let (status, body) = send(
        &app,
        "POST",
        "/enrich",
        Some(json!({
            "prompt": "who is here?",
            "context": [{
                "class_label": "person",
                "confidence": 0.8,
                "bbox": {"x": 0.0, "y": 0.0, "width": 10.0, "height": 20.0},
                "distance_m": 1.4
            }]
        })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["text"], "A person is nearby.");
    assert_eq!(body["frame_id"], Value::Null);
}

#[tokio::test]
async fn test_enrich_failures_open_circuit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let (app, _) = create_test_router(Some(enrichment(&server.uri())));

    for _ in 0..2 {
        let (status, _) = send(&app, "GET", "/enrich/scene", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    let (status, body) = send(&app, "POST", "/enrich", Some(json!({"prompt": "hi"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["detail"], "enrichment temporarily unavailable");
    assert_eq!(body["code"], "circuit_open");

    // Enrichment is optional
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["components"]["enrichment"]["live"], false);
}

#[tokio::test]
async fn test_metrics_endpoint_and_headers() {
    let handle = PrometheusBuilder::new().build_recorder().handle();
    let state = AppState::new(ApiConfig::default(), pipeline(), None);
    let app = create_router(state, Some(handle));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .header("X-Request-ID", "abc-123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-request-id").unwrap(), "abc-123");
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}
