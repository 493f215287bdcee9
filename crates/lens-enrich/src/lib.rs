//! Client for the scene enrichment service.
//!
//! The service is an Ollama-compatible text generation endpoint. Every call
//! goes through a `CircuitBreaker` so a dead or overloaded service fails fast
//! instead of tying up request handlers.

pub mod circuit_breaker;
pub mod client;
pub mod error;
pub mod metrics;
pub mod prompt;
pub mod types;

pub use circuit_breaker::{BreakerConfig, CallPermit, CircuitBreaker, CircuitState};
pub use client::{EnrichmentClient, EnrichmentConfig};
pub use error::{EnrichError, EnrichResult};
pub use prompt::{enhanced_prompt, scene_analysis_prompt, scene_context};
pub use types::{GenerateRequest, GenerateResponse, TagsResponse};
