//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use lens_enrich::EnrichError;
use lens_pipeline::PipelineError;
use lens_vision::VisionError;
use serde::Serialize;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Enrichment error: {0}")]
    Enrich(#[from] EnrichError),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Pipeline(e) => match e {
                PipelineError::AlreadyRunning | PipelineError::NotRunning => StatusCode::CONFLICT,
                PipelineError::Vision(
                    VisionError::ModelNotFound(_)
                    | VisionError::BackendUnavailable(_)
                    | VisionError::Acquisition(_)
                    | VisionError::AcquisitionTimeout(_),
                ) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Enrich(e) => match e {
                EnrichError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
                EnrichError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::BAD_GATEWAY,
            },
        }
    }

    fn code(&self) -> Option<&'static str> {
        match self {
            ApiError::Pipeline(PipelineError::AlreadyRunning) => Some("already_running"),
            ApiError::Pipeline(PipelineError::NotRunning) => Some("not_running"),
            ApiError::Pipeline(PipelineError::Vision(_)) => Some("detector_unavailable"),
            ApiError::Enrich(EnrichError::CircuitOpen) => Some("circuit_open"),
            ApiError::Enrich(EnrichError::InvalidRequest(_)) => Some("invalid_request"),
            ApiError::Enrich(_) => Some("enrichment_failed"),
            _ => None,
        }
    }

    fn is_internal(&self) -> bool {
        self.status_code() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't expose internal error details in production
        let detail = match &self {
            ApiError::Enrich(EnrichError::CircuitOpen) => {
                "enrichment temporarily unavailable".to_string()
            }
            _ if self.is_internal()
                && std::env::var("ENVIRONMENT").unwrap_or_default() == "production" =>
            {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };

        let body = ErrorResponse {
            detail,
            code: self.code().map(str::to_string),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrichment_status_mapping() {
        assert_eq!(
            ApiError::from(EnrichError::CircuitOpen).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(EnrichError::remote("500")).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(EnrichError::Timeout(60)).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::from(EnrichError::InvalidRequest("empty".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_detector_failure_is_unavailable() {
        let err = ApiError::from(PipelineError::from(VisionError::model_not_found("m.onnx")));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.code(), Some("detector_unavailable"));
    }
}
