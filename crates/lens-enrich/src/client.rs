//! Enrichment service HTTP client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lens_models::DetectionBatch;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::circuit_breaker::{BreakerConfig, CircuitBreaker};
use crate::error::{EnrichError, EnrichResult};
use crate::metrics;
use crate::prompt::{enhanced_prompt, scene_analysis_prompt};
use crate::types::{GenerateRequest, GenerateResponse, TagsResponse};

/// Configuration for the enrichment client.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Whether enrichment is offered at all
    pub enabled: bool,
    /// Base URL of the generation service
    pub base_url: String,
    /// Model name sent with every request
    pub model: String,
    /// Request timeout
    pub timeout: Duration,
    /// Max outstanding requests
    pub max_concurrent: usize,
    pub breaker: BreakerConfig,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://localhost:11434".to_string(),
            model: "llama2".to_string(),
            timeout: Duration::from_secs(60),
            max_concurrent: 10,
            breaker: BreakerConfig::default(),
        }
    }
}

impl EnrichmentConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("ENRICH_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(true),
            base_url: std::env::var("ENRICH_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            model: std::env::var("ENRICH_MODEL").unwrap_or_else(|_| "llama2".to_string()),
            timeout: Duration::from_secs(
                std::env::var("ENRICH_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            max_concurrent: std::env::var("ENRICH_MAX_CONCURRENT")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(10),
            breaker: BreakerConfig::from_env(),
        }
    }
}

/// Pooled, circuit-broken client for the generation service.
pub struct EnrichmentClient {
    http: Client,
    config: EnrichmentConfig,
    breaker: CircuitBreaker,
    permits: Arc<Semaphore>,
}

impl EnrichmentClient {
    /// Create a new enrichment client.
    pub fn new(config: EnrichmentConfig) -> EnrichResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_concurrent)
            .build()
            .map_err(EnrichError::Network)?;

        Ok(Self {
            http,
            breaker: CircuitBreaker::new("enrichment", config.breaker),
            permits: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
            config,
        })
    }

    /// Create from environment variables.
    pub fn from_env() -> EnrichResult<Self> {
        Self::new(EnrichmentConfig::from_env())
    }

    /// Answer a user prompt in the context of a detection batch.
    pub async fn query(&self, prompt: &str, context: &DetectionBatch) -> EnrichResult<String> {
        if prompt.trim().is_empty() {
            return Err(EnrichError::InvalidRequest("prompt must not be empty".to_string()));
        }
        self.generate(&enhanced_prompt(prompt, context)).await
    }

    /// Ask for an open-ended analysis of a detection batch.
    pub async fn analyze_scene(&self, context: &DetectionBatch) -> EnrichResult<String> {
        self.generate(&scene_analysis_prompt(context)).await
    }

    /// Send a raw prompt through the breaker.
    pub async fn generate(&self, prompt: &str) -> EnrichResult<String> {
        let started = Instant::now();
        let result = self.breaker.call(|| self.send(prompt)).await;

        match &result {
            Ok(_) => metrics::record_request("success", started.elapsed().as_secs_f64()),
            Err(EnrichError::CircuitOpen) => {
                metrics::record_rejected();
                debug!("Enrichment rejected, circuit open");
            }
            Err(e) => {
                metrics::record_request("failure", started.elapsed().as_secs_f64());
                warn!(
                    error = %e,
                    failure_count = self.breaker.failure_count(),
                    "Enrichment request failed"
                );
            }
        }
        result
    }

    async fn send(&self, prompt: &str) -> EnrichResult<String> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| EnrichError::remote("request pool closed"))?;

        let url = format!("{}/api/generate", self.config.base_url.trim_end_matches('/'));
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
        };

        debug!(url = %url, model = %request.model, "Sending enrichment request");

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichError::remote(format!(
                "service returned {}: {}",
                status, body
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| EnrichError::invalid_response(e.to_string()))?;
        Ok(generated.text)
    }

    fn map_send_error(&self, e: reqwest::Error) -> EnrichError {
        if e.is_timeout() {
            EnrichError::Timeout(self.config.timeout.as_secs())
        } else {
            EnrichError::Network(e)
        }
    }

    /// Check if the service is reachable. Does not touch the breaker.
    pub async fn health_check(&self) -> EnrichResult<bool> {
        let url = format!("{}/api/tags", self.config.base_url.trim_end_matches('/'));

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                let tags: TagsResponse = response.json().await.unwrap_or_default();
                debug!(models = tags.models.len(), "Enrichment service healthy");
                Ok(true)
            }
            Ok(response) => {
                warn!("Enrichment health check failed: {}", response.status());
                Ok(false)
            }
            Err(e) => {
                warn!("Enrichment health check error: {}", e);
                Ok(false)
            }
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn config(&self) -> &EnrichmentConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitState;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> EnrichmentClient {
        EnrichmentClient::new(EnrichmentConfig {
            base_url: server.uri(),
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap()
    }

    fn empty_batch() -> DetectionBatch {
        DetectionBatch::empty(1, Utc::now())
    }

    #[test]
    fn test_config_defaults() {
        let config = EnrichmentConfig::default();
        assert_eq!(config.base_url, "http://localhost:11434");
        assert_eq!(config.model, "llama2");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.max_concurrent, 10);
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[tokio::test]
    async fn test_query_sends_model_and_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "llama2",
                "stream": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "model": "llama2",
                "response": "Looks like an office.",
                "done": true
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let text = client.query("what room is this?", &empty_batch()).await.unwrap();
        assert_eq!(text, "Looks like an office.");
        assert_eq!(client.breaker().state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_server_errors_open_circuit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .expect(5)
            .mount(&server)
            .await;

        let client = client_for(&server);
        for _ in 0..5 {
            let err = client.generate("hello").await.unwrap_err();
            assert!(matches!(err, EnrichError::Remote(_)));
        }
        assert_eq!(client.breaker().state(), CircuitState::Open);

        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, EnrichError::CircuitOpen));
    }

    #[tokio::test]
    async fn test_timeout_is_remote_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"response": "late"}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, EnrichError::Timeout(_)));
        assert_eq!(client.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.generate("hello").await.unwrap_err();
        assert!(matches!(err, EnrichError::InvalidResponse(_)));
        assert_eq!(client.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_connection_refused_counts_as_failure() {
        let client = EnrichmentClient::new(EnrichmentConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(500),
            ..Default::default()
        })
        .unwrap();

        let err = client.generate("hello").await.unwrap_err();
        assert!(err.is_remote_failure());
        assert_eq!(client.breaker().failure_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected_locally() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client.query("   ", &empty_batch()).await.unwrap_err();
        assert!(matches!(err, EnrichError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"models": [{"name": "llama2:latest"}]})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.health_check().await.unwrap());

        let down = EnrichmentClient::new(EnrichmentConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_millis(200),
            ..Default::default()
        })
        .unwrap();
        assert!(!down.health_check().await.unwrap());
        assert_eq!(down.breaker().failure_count(), 0);
    }
}
