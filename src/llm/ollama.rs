//! Classifier backed by an Ollama-compatible `/api/generate` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ClassificationInput, LlmConfig, LlmError, TargetClassifier};
use crate::models::Classification;

/// Posts included in the prompt.
const PROMPT_POST_SAMPLE: usize = 5;
const PROMPT_TITLE_CHARS: usize = 80;

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

pub struct OllamaClassifier {
    config: LlmConfig,
    client: Client,
}

impl OllamaClassifier {
    pub fn new(config: LlmConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    /// Check if the endpoint answers.
    pub async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.config.endpoint.trim_end_matches('/'));
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn call_ollama(&self, prompt: &str) -> Result<String, LlmError> {
        let request = OllamaRequest {
            model: self.config.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        };

        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {}: {}", status, body)));
        }

        let ollama_resp: OllamaResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        Ok(ollama_resp.response)
    }
}

#[async_trait]
impl TargetClassifier for OllamaClassifier {
    async fn classify(&self, input: &ClassificationInput) -> Result<Classification, LlmError> {
        let prompt = build_prompt(input, &self.config.labels, self.config.max_input_chars);
        debug!("Classifying r/{}", input.target);
        let response = self.call_ollama(&prompt).await?;
        parse_classification(&response)
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Render the classification prompt for one target.
pub fn build_prompt(input: &ClassificationInput, labels: &[String], max_chars: usize) -> String {
    let description = input
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
        .unwrap_or("No description");

    let rules = if input.rules.is_empty() {
        "No rules provided".to_string()
    } else {
        input
            .rules
            .iter()
            .map(|r| format!("- {}", r))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let mut posts = String::new();
    if !input.recent_posts.is_empty() {
        posts.push_str("\n\nRecent post titles:");
        for post in input.recent_posts.iter().take(PROMPT_POST_SAMPLE) {
            posts.push_str(&format!("\n- \"{}\"", truncate(&post.title, PROMPT_TITLE_CHARS)));
        }
    }

    let label_hint = if labels.is_empty() {
        "Choose short lowercase labels that describe the main themes.".to_string()
    } else {
        format!("Choose only from these labels: {}.", labels.join(", "))
    };

    format!(
        r#"Classify this community and return only a JSON object.

Community: r/{target}
Description: {description}

Rules:
{rules}{posts}

{label_hint}

Return JSON of the form:
{{"labels": ["label1", "label2"], "confidence": 0.0 to 1.0, "rationale": "one or two sentences"}}"#,
        target = input.target,
        description = truncate(description, max_chars),
        rules = truncate(&rules, max_chars),
    )
}

/// Parse a model response into a [`Classification`].
///
/// Accepts bare JSON or JSON wrapped in prose or a code fence. Confidence is
/// clamped to `[0, 1]`, and textual confidences map to fixed values.
pub fn parse_classification(response: &str) -> Result<Classification, LlmError> {
    let start = response.find('{');
    let end = response.rfind('}');
    let json = match (start, end) {
        (Some(s), Some(e)) if e > s => &response[s..=e],
        _ => return Err(LlmError::Parse(format!("no JSON object in: {}", truncate(response, 120)))),
    };

    let mut value: serde_json::Value =
        serde_json::from_str(json).map_err(|e| LlmError::Parse(e.to_string()))?;

    if let Some(conf) = value.get("confidence").and_then(|c| c.as_str()) {
        let mapped = match conf.to_lowercase().as_str() {
            "high" => 0.9,
            "medium" => 0.6,
            "low" => 0.3,
            _ => 0.0,
        };
        value["confidence"] = serde_json::json!(mapped);
    }

    let mut classification: Classification =
        serde_json::from_value(value).map_err(|e| LlmError::Parse(e.to_string()))?;
    classification.confidence = classification.confidence.clamp(0.0, 1.0);
    classification.labels = classification
        .labels
        .into_iter()
        .map(|l| l.trim().to_lowercase())
        .filter(|l| !l.is_empty())
        .collect();
    Ok(classification)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_parse_plain_json() {
        let c = parse_classification(
            r#"{"labels": ["Amateur", " pics "], "confidence": 0.8, "rationale": "rules say so"}"#,
        )
        .unwrap();
        assert_eq!(c.labels, vec!["amateur", "pics"]);
        assert!((c.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(c.rationale, "rules say so");
    }

    #[test]
    fn test_parse_fenced_with_textual_confidence() {
        let response = "Here you go:\n```json\n{\"labels\": [\"x\"], \"confidence\": \"high\", \"reasoning\": \"r\"}\n```";
        let c = parse_classification(response).unwrap();
        assert_eq!(c.labels, vec!["x"]);
        assert!((c.confidence - 0.9).abs() < f64::EPSILON);
        assert_eq!(c.rationale, "r");
    }

    #[test]
    fn test_parse_clamps_and_rejects() {
        let c = parse_classification(r#"{"labels": [], "confidence": 7}"#).unwrap();
        assert_eq!(c.confidence, 1.0);
        assert!(matches!(parse_classification("no idea"), Err(LlmError::Parse(_))));
    }

    #[test]
    fn test_prompt_mentions_labels_and_rules() {
        let input = ClassificationInput {
            target: "example".to_string(),
            description: None,
            rules: vec!["Be nice".to_string()],
            recent_posts: Vec::new(),
        };
        let prompt = build_prompt(&input, &["alpha".to_string(), "beta".to_string()], 1000);
        assert!(prompt.contains("r/example"));
        assert!(prompt.contains("- Be nice"));
        assert!(prompt.contains("alpha, beta"));
        assert!(prompt.contains("No description"));
    }

    #[tokio::test]
    async fn test_classify_against_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "response": "{\"labels\": [\"a\"], \"confidence\": 0.5, \"rationale\": \"ok\"}",
                "done": true
            })))
            .mount(&server)
            .await;

        let classifier = OllamaClassifier::new(LlmConfig {
            enabled: true,
            endpoint: server.uri(),
            ..Default::default()
        })
        .unwrap();
        let c = classifier
            .classify(&ClassificationInput {
                target: "t".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(c.labels, vec!["a"]);
    }

    #[tokio::test]
    async fn test_api_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let classifier = OllamaClassifier::new(LlmConfig {
            endpoint: server.uri(),
            ..Default::default()
        })
        .unwrap();
        let err = classifier
            .classify(&ClassificationInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Api(_)));
    }
}
