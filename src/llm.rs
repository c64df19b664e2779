use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A single text-completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            temperature: 0.1,
            max_tokens: 1000,
        }
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Black-box text completion service.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn model(&self) -> &str;
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client.
#[derive(Clone)]
pub struct LlmClient {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: Option<String>, model: String, base_url: String) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn from_config(config: &crate::config::Config) -> Result<Self> {
        Self::new(
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_base_url.clone(),
        )
    }
}

#[async_trait]
impl CompletionProvider for LlmClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::LlmUnavailable("no API key configured".to_string()))?;

        let body = ChatCompletionBody {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &request.system },
                ChatMessage { role: "user", content: &request.prompt },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        debug!(model = %self.model, prompt_chars = request.prompt.len(), "calling LLM");

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("LLM API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(%status, "LLM API returned an error");
            return Err(AppError::Llm(format!(
                "LLM API returned {}: {}",
                status,
                truncate(&text, 300)
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse LLM response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::Llm("No content in LLM response".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Removes surrounding markdown code fences (```json ... ```).
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_open = match trimmed.strip_prefix("```") {
        Some(rest) => match rest.find('\n') {
            Some(idx) => &rest[idx + 1..],
            None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
        },
        None => trimmed,
    };
    without_open.trim().trim_end_matches("```").trim()
}

/// Parses the first JSON object found in an LLM reply.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> Result<T> {
    let cleaned = strip_code_fences(raw);
    let candidate = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned,
    };
    serde_json::from_str(candidate).map_err(|e| {
        AppError::Llm(format!(
            "Failed to parse LLM response: {}. Response: {}",
            e,
            truncate(cleaned, 200)
        ))
    })
}

pub(crate) fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}
