//! Enrichment client error types.

use thiserror::Error;

pub type EnrichResult<T> = Result<T, EnrichError>;

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Enrichment temporarily unavailable: circuit open")]
    CircuitOpen,

    #[error("Enrichment service error: {0}")]
    Remote(String),

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl EnrichError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::Remote(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Whether this outcome counts against the circuit breaker.
    ///
    /// A rejected request never reached the service and `CircuitOpen` never
    /// left the process.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            EnrichError::Remote(_)
                | EnrichError::Timeout(_)
                | EnrichError::Network(_)
                | EnrichError::InvalidResponse(_)
        )
    }
}
