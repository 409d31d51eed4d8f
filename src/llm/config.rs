//! Classifier configuration.

use serde::{Deserialize, Serialize};

/// Configuration for the target classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Classification is skipped entirely unless enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Ollama-compatible API endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tokens in response
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Temperature for generation (0.0 - 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Labels the model may choose from. Empty lets the model pick freely.
    #[serde(default)]
    pub labels: Vec<String>,
    /// Characters of description and rules text sent with each request.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_max_tokens() -> u32 {
    500
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_input_chars() -> usize {
    4000
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            labels: Vec::new(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

impl LlmConfig {
    /// Apply `FRONTIER_LLM_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("FRONTIER_LLM_ENDPOINT") {
            self.endpoint = endpoint;
            self.enabled = true;
        }
        if let Ok(model) = std::env::var("FRONTIER_LLM_MODEL") {
            self.model = model;
        }
        self
    }
}
