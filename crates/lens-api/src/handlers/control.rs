//! Pipeline start/stop handlers.

use axum::extract::State;
use axum::Json;
use lens_pipeline::PipelineError;
use serde::Serialize;
use tracing::{error, info};

use crate::error::ApiResult;
use crate::state::AppState;

/// Outcome of a control request.
#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub status: &'static str,
    pub message: String,
}

impl ControlResponse {
    fn new(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

/// Start detection. Starting twice is not an error.
pub async fn start_pipeline(State(state): State<AppState>) -> ApiResult<Json<ControlResponse>> {
    match state.pipeline.start().await {
        Ok(()) => {
            info!("Detection started via API");
            Ok(Json(ControlResponse::new("started", "Object detection started")))
        }
        Err(PipelineError::AlreadyRunning) => Ok(Json(ControlResponse::new(
            "already_running",
            "Detection already running",
        ))),
        Err(e) => {
            error!(error = %e, "Failed to start detection");
            Err(e.into())
        }
    }
}

/// Stop detection. Stopping an idle pipeline is not an error.
pub async fn stop_pipeline(State(state): State<AppState>) -> ApiResult<Json<ControlResponse>> {
    match state.pipeline.stop().await {
        Ok(()) => {
            info!("Detection stopped via API");
            Ok(Json(ControlResponse::new("stopped", "Object detection stopped")))
        }
        Err(PipelineError::NotRunning) => Ok(Json(ControlResponse::new(
            "not_running",
            "Detection is not running",
        ))),
        Err(e) => Err(e.into()),
    }
}
