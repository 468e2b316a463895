use crate::types::{Bias, BiasAnalysis, NewsError, Result, Tone};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest explanation we keep from the model.
const MAX_EXPLANATION_CHARS: usize = 200;

/// Titles at or below this length are not worth a model call.
const MIN_TITLE_CHARS: usize = 10;

/// Low-level text completion client. Implemented over an OpenAI-style
/// chat endpoint in production and by a canned mock in tests.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            timeout_seconds: 15,
        }
    }
}

/// Chat-completions HTTP client.
pub struct HttpModelClient {
    client: reqwest::Client,
    config: ModelConfig,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpModelClient {
    pub fn new(config: ModelConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, config }
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.2,
        });

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NewsError::General(format!(
                "model endpoint returned HTTP {}",
                status
            )));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| NewsError::General("model response carried no choices".to_string()))
    }
}

/// Mock model for development and tests: replays a fixed response or fails,
/// optionally after a simulated delay.
pub struct MockModelClient {
    response: std::result::Result<String, String>,
    delay_ms: u64,
}

impl MockModelClient {
    pub fn replying(response: impl Into<String>) -> Self {
        Self {
            response: Ok(response.into()),
            delay_ms: 0,
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(message.into()),
            delay_ms: 0,
        }
    }

    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(&self, _prompt: &str) -> Result<String> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(message) => Err(NewsError::General(message.clone())),
        }
    }
}

/// Classifies one article's political bias and tone via a language model.
/// `classify` never fails: every error path resolves to the fixed fallback.
pub struct BiasClassifier {
    model: Box<dyn ModelClient>,
}

impl BiasClassifier {
    pub fn new(model: Box<dyn ModelClient>) -> Self {
        Self { model }
    }

    pub async fn classify(&self, title: &str, summary: &str, source_id: &str) -> BiasAnalysis {
        let prompt = build_prompt(title, summary, source_id);

        let response = match self.model.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Classification call failed for {}: {}", source_id, e);
                return BiasAnalysis::fallback();
            }
        };

        match serde_json::from_str::<Value>(strip_code_fences(&response)) {
            Ok(value) => repair_analysis(&value),
            Err(e) => {
                debug!("Unparseable model output for {}: {}", source_id, e);
                BiasAnalysis::fallback()
            }
        }
    }
}

/// Whether a title is substantial enough to spend a model call on.
pub fn should_classify(title: &str) -> bool {
    title.trim().chars().count() > MIN_TITLE_CHARS
}

fn build_prompt(title: &str, summary: &str, source_id: &str) -> String {
    format!(
        "Analyze the political bias of this news article from source \"{}\".\n\
         Title: {}\n\
         Summary: {}\n\n\
         Respond with ONLY a JSON object, no prose, with exactly these fields:\n\
         {{\"political_bias\": \"left\"|\"center\"|\"right\", \
         \"confidence\": number between 0 and 1, \
         \"emotional_tone\": \"neutral\"|\"positive\"|\"negative\", \
         \"factual_ratio\": number between 0 and 1, \
         \"explanation\": string under 200 characters}}",
        source_id, title, summary
    )
}

/// Strip markdown code fences some models wrap JSON in.
fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

/// Validate and clamp the parsed object field by field. Invalid or missing
/// fields snap to the fallback value; nothing partially valid escapes.
fn repair_analysis(value: &Value) -> BiasAnalysis {
    let fallback = BiasAnalysis::fallback();

    if !value.is_object() {
        return fallback;
    }

    let political_bias = value
        .get("political_bias")
        .and_then(Value::as_str)
        .and_then(Bias::parse)
        .unwrap_or(fallback.political_bias);

    let confidence = value
        .get("confidence")
        .and_then(Value::as_f64)
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(fallback.confidence);

    let emotional_tone = value
        .get("emotional_tone")
        .and_then(Value::as_str)
        .and_then(Tone::parse)
        .unwrap_or(fallback.emotional_tone);

    let factual_ratio = value
        .get("factual_ratio")
        .and_then(Value::as_f64)
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(fallback.factual_ratio);

    let explanation = value
        .get("explanation")
        .and_then(Value::as_str)
        .map(|s| truncate_chars(s.trim(), MAX_EXPLANATION_CHARS))
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback.explanation);

    BiasAnalysis {
        political_bias,
        confidence,
        emotional_tone,
        factual_ratio,
        explanation,
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier(response: &str) -> BiasClassifier {
        BiasClassifier::new(Box::new(MockModelClient::replying(response)))
    }

    fn assert_bounded(analysis: &BiasAnalysis) {
        assert!((0.0..=1.0).contains(&analysis.confidence));
        assert!((0.0..=1.0).contains(&analysis.factual_ratio));
        assert!(analysis.explanation.chars().count() <= MAX_EXPLANATION_CHARS);
    }

    #[tokio::test]
    async fn valid_output_passes_through() {
        let c = classifier(
            r#"{"political_bias":"left","confidence":0.85,"emotional_tone":"negative","factual_ratio":0.6,"explanation":"Loaded framing."}"#,
        );
        let analysis = c.classify("Senate passes budget bill", "Details.", "npr").await;
        assert_eq!(analysis.political_bias, Bias::Left);
        assert_eq!(analysis.confidence, 0.85);
        assert_eq!(analysis.emotional_tone, Tone::Negative);
        assert_eq!(analysis.explanation, "Loaded framing.");
        assert_bounded(&analysis);
    }

    #[tokio::test]
    async fn fenced_output_is_unwrapped() {
        let c = classifier(
            "```json\n{\"political_bias\":\"right\",\"confidence\":0.7,\"emotional_tone\":\"neutral\",\"factual_ratio\":0.9,\"explanation\":\"ok\"}\n```",
        );
        let analysis = c.classify("Long enough headline", "", "fox").await;
        assert_eq!(analysis.political_bias, Bias::Right);
        assert_bounded(&analysis);
    }

    #[tokio::test]
    async fn garbage_output_maps_to_fallback() {
        let c = classifier("I cannot help with that request.");
        let analysis = c.classify("Long enough headline", "", "bbc").await;
        assert_eq!(analysis, BiasAnalysis::fallback());
    }

    #[tokio::test]
    async fn model_error_maps_to_fallback() {
        let c = BiasClassifier::new(Box::new(MockModelClient::failing("connection refused")));
        let analysis = c.classify("Long enough headline", "", "bbc").await;
        assert_eq!(analysis, BiasAnalysis::fallback());
    }

    #[tokio::test]
    async fn out_of_range_numbers_are_clamped() {
        let c = classifier(
            r#"{"political_bias":"center","confidence":3.5,"emotional_tone":"positive","factual_ratio":-1,"explanation":"x"}"#,
        );
        let analysis = c.classify("Long enough headline", "", "bbc").await;
        assert_eq!(analysis.confidence, 1.0);
        assert_eq!(analysis.factual_ratio, 0.0);
        assert_bounded(&analysis);
    }

    #[tokio::test]
    async fn wrong_types_snap_to_fallback_values() {
        let c = classifier(
            r#"{"political_bias":"anarchist","confidence":"high","emotional_tone":42,"factual_ratio":null,"explanation":{"nested":true}}"#,
        );
        let analysis = c.classify("Long enough headline", "", "bbc").await;
        assert_eq!(analysis, BiasAnalysis::fallback());
    }

    #[tokio::test]
    async fn partial_output_keeps_valid_fields() {
        let c = classifier(r#"{"political_bias":"right","emotional_tone":"positive"}"#);
        let analysis = c.classify("Long enough headline", "", "bbc").await;
        assert_eq!(analysis.political_bias, Bias::Right);
        assert_eq!(analysis.emotional_tone, Tone::Positive);
        assert_eq!(analysis.confidence, BiasAnalysis::fallback().confidence);
        assert_eq!(analysis.factual_ratio, BiasAnalysis::fallback().factual_ratio);
    }

    #[tokio::test]
    async fn long_explanations_are_capped() {
        let long = "x".repeat(500);
        let response = format!(
            r#"{{"political_bias":"center","confidence":0.5,"emotional_tone":"neutral","factual_ratio":0.5,"explanation":"{}"}}"#,
            long
        );
        let c = classifier(&response);
        let analysis = c.classify("Long enough headline", "", "bbc").await;
        assert_eq!(analysis.explanation.chars().count(), MAX_EXPLANATION_CHARS);
    }

    #[test]
    fn short_titles_skip_classification() {
        assert!(!should_classify("Brief"));
        assert!(should_classify("A headline long enough to analyze"));
    }
}
