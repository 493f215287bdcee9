//! Enrichment handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use lens_enrich::EnrichmentClient;
use lens_models::{Detection, DetectionBatch};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrichRequest {
    pub prompt: String,
    /// Explicit detections to reason about instead of the latest batch
    #[serde(default)]
    pub context: Option<Vec<Detection>>,
}

#[derive(Debug, Serialize)]
pub struct EnrichResponse {
    pub text: String,
    /// Frame the context came from; `None` for explicit or empty context
    pub frame_id: Option<u64>,
}

fn client(state: &AppState) -> ApiResult<Arc<EnrichmentClient>> {
    state
        .enrichment()
        .cloned()
        .ok_or_else(|| ApiError::unavailable("enrichment is disabled"))
}

/// Re-validate caller supplied detections.
fn explicit_context(detections: Vec<Detection>) -> ApiResult<DetectionBatch> {
    let detections = detections
        .into_iter()
        .map(|d| {
            if !(0.0..=1.0).contains(&d.confidence) {
                return Err(ApiError::bad_request(format!(
                    "confidence for '{}' must be within [0, 1]",
                    d.class_label
                )));
            }
            Detection::new(d.class_label, d.confidence, d.bbox)
                .map(|valid| valid.with_distance(d.distance_m))
                .ok_or_else(|| ApiError::bad_request("context contains a non-finite detection"))
        })
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(DetectionBatch::new(0, Utc::now(), detections))
}

/// Snapshot to use as context, plus its frame id.
fn latest_context(state: &AppState) -> (Arc<DetectionBatch>, Option<u64>) {
    match state.latest() {
        Some(batch) => {
            let frame_id = Some(batch.frame_id);
            (batch, frame_id)
        }
        None => (Arc::new(DetectionBatch::empty(0, Utc::now())), None),
    }
}

/// `POST /enrich`
pub async fn enrich(
    State(state): State<AppState>,
    Json(request): Json<EnrichRequest>,
) -> ApiResult<Json<EnrichResponse>> {
    if request.prompt.trim().is_empty() {
        return Err(ApiError::bad_request("prompt must not be empty"));
    }
    let client = client(&state)?;

    let (context, frame_id) = match request.context {
        Some(detections) => (Arc::new(explicit_context(detections)?), None),
        None => latest_context(&state),
    };

    info!(
        frame_id = ?frame_id,
        objects = context.len(),
        "Enrichment query"
    );
    let text = client.query(&request.prompt, &context).await?;

    Ok(Json(EnrichResponse { text, frame_id }))
}

/// `GET /enrich/scene`
pub async fn enrich_scene(State(state): State<AppState>) -> ApiResult<Json<EnrichResponse>> {
    let client = client(&state)?;
    let (context, frame_id) = latest_context(&state);

    let text = client.analyze_scene(&context).await?;

    Ok(Json(EnrichResponse { text, frame_id }))
}
