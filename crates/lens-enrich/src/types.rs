//! Enrichment service request/response types.

use serde::{Deserialize, Serialize};

/// Text generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    /// Always false; the client reads one complete response
    pub stream: bool,
}

/// Text generation response. Ollama names the field `response`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(alias = "response")]
    pub text: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Model listing returned by the health probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTag {
    pub name: String,
}
