//! Detection read handlers.
//!
//! All reads work on the `Arc` snapshot of the last published batch.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use lens_models::{Detection, DetectionQuery, DetectionSummary};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Latest detections.
#[derive(Debug, Serialize)]
pub struct DetectionsResponse {
    pub frame_id: Option<u64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub detections: Vec<Detection>,
    pub count: usize,
}

pub async fn get_detections(State(state): State<AppState>) -> Json<DetectionsResponse> {
    let response = match state.latest() {
        Some(batch) => DetectionsResponse {
            frame_id: Some(batch.frame_id),
            timestamp: Some(batch.timestamp),
            count: batch.len(),
            detections: batch.detections.clone(),
        },
        None => DetectionsResponse {
            frame_id: None,
            timestamp: None,
            detections: Vec::new(),
            count: 0,
        },
    };
    Json(response)
}

pub async fn get_summary(State(state): State<AppState>) -> Json<DetectionSummary> {
    let summary = state
        .latest()
        .map(|batch| batch.summary())
        .unwrap_or_else(DetectionSummary::empty);
    Json(summary)
}

/// Filtered detections.
#[derive(Debug, Serialize)]
pub struct QueryResponse {
    pub query: DetectionQuery,
    pub frame_id: Option<u64>,
    pub results: Vec<Detection>,
    pub count: usize,
}

/// `GET /query?class=&min_confidence=&max_distance=`
pub async fn query_detections(
    State(state): State<AppState>,
    Query(query): Query<DetectionQuery>,
) -> ApiResult<Json<QueryResponse>> {
    query.validate().map_err(ApiError::bad_request)?;

    let latest = state.latest();
    let results = latest
        .as_ref()
        .map(|batch| batch.query(&query))
        .unwrap_or_default();

    Ok(Json(QueryResponse {
        frame_id: latest.map(|batch| batch.frame_id),
        count: results.len(),
        results,
        query,
    }))
}
