//! Axum HTTP API server.
//!
//! This crate provides:
//! - Pipeline start/stop control
//! - Latest detections, summaries and filtered queries
//! - Server-sent event stream of published batches
//! - Scene enrichment through the circuit-broken client
//! - Health and Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
