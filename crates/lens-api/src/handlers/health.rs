//! Health check handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use lens_models::HealthStatus;
use lens_pipeline::PipelineStatus;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    pub status: HealthStatus,
    pub running: bool,
    pub pipeline: PipelineStatus,
    pub version: &'static str,
}

/// Poll every component. Returns 503 when a required component is down.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let status = state.health.poll();
    let pipeline = state.pipeline.status();

    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            status,
            running: pipeline.running,
            pipeline,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}
