//! OpenAI chat completion implementation.

use super::{ChatCompletion, CompletionError};
use crate::message::ChatTurn;
use async_trait::async_trait;
use relay_common::config::LlmConfig;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// OpenAI-compatible chat completion client.
pub struct OpenAiCompletion {
    client: reqwest::Client,
    base_url: String,
    model: String,
    max_tokens: Option<u32>,
    temperature: f32,
}

impl OpenAiCompletion {
    /// Create a client for the public OpenAI API.
    pub fn new(api_key: &str, model: impl Into<String>) -> Self {
        Self::with_base_url(api_key, "https://api.openai.com", model)
    }

    /// Create with custom base URL (for compatible APIs).
    pub fn with_base_url(api_key: &str, base_url: &str, model: impl Into<String>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .unwrap_or_else(|_| HeaderValue::from_static("")),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.into(),
            max_tokens: None,
            temperature: 0.7,
        }
    }

    /// Build from the `llm` configuration section.
    pub fn from_config(api_key: &str, config: &LlmConfig) -> Self {
        Self::with_base_url(api_key, &config.base_url, config.model.clone())
            .with_max_tokens(config.max_tokens)
            .with_temperature(config.temperature)
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatCompletion for OpenAiCompletion {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, turns: &[ChatTurn]) -> Result<String, CompletionError> {
        let start = Instant::now();
        let url = format!("{}/v1/chat/completions", self.base_url);

        let request = OpenAiRequest {
            model: &self.model,
            messages: turns
                .iter()
                .map(|t| OpenAiMessage {
                    role: t.role.as_str(),
                    content: &t.content,
                })
                .collect(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::from_status(status.as_u16(), body));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::InvalidResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(CompletionError::Empty)?;

        tracing::info!(
            model = %self.model,
            turns = turns.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "Completion received"
        );

        Ok(content)
    }
}

// ============================================================================
// OpenAI API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
