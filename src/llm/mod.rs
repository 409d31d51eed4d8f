//! Text classification of targets through a local LLM.
//!
//! The crawler only assembles input text and stores the structured result;
//! which labels exist is a configuration concern.

mod config;
mod ollama;

pub use config::LlmConfig;
pub use ollama::{build_prompt, parse_classification, OllamaClassifier};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Classification, Post};

/// Errors from the classification service.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("unparseable classification: {0}")]
    Parse(String),
}

/// What the classifier is told about a target.
#[derive(Debug, Clone, Default)]
pub struct ClassificationInput {
    pub target: String,
    pub description: Option<String>,
    pub rules: Vec<String>,
    pub recent_posts: Vec<Post>,
}

#[async_trait]
pub trait TargetClassifier: Send + Sync {
    async fn classify(&self, input: &ClassificationInput) -> Result<Classification, LlmError>;
}
