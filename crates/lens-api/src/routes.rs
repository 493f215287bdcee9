//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    enrich, enrich_scene, get_detections, get_summary, health, query_detections, start_pipeline,
    stop_pipeline, stream_detections,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let control_routes = Router::new()
        .route("/start", post(start_pipeline))
        .route("/stop", post(stop_pipeline));

    let detection_routes = Router::new()
        .route("/detections", get(get_detections))
        .route("/summary", get(get_summary))
        .route("/query", get(query_detections))
        .route("/stream", get(stream_detections));

    let enrich_routes = Router::new()
        .route("/enrich", post(enrich))
        .route("/enrich/scene", get(enrich_scene));

    let health_routes = Router::new().route("/health", get(health));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .merge(control_routes)
        .merge(detection_routes)
        .merge(enrich_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
