//! Language-model client
//!
//! Speaks the OpenAI-compatible chat completions protocol. OpenRouter is the
//! default host; any compatible endpoint works.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use trackmind_common::config::CreativeConfig;

/// Errors from language-model calls
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("No API key configured")]
    MissingKey,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out")]
    Timeout,
}

/// Per-request sampling options
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1500,
            timeout: Duration::from_secs(90),
        }
    }
}

impl From<&CreativeConfig> for CompletionOptions {
    fn from(config: &CreativeConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

/// Language-model collaborator
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Complete a single-turn prompt, optionally pointing at hosted media
    async fn complete(
        &self,
        prompt: &str,
        media_ref: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<String, LlmError>;
}

/// User message body: media reference first, then the prompt
pub fn user_message(prompt: &str, media_ref: Option<&str>) -> String {
    match media_ref {
        Some(url) => format!("Audio: {}\n\n{}", url, prompt),
        None => prompt.to_string(),
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// OpenRouter (OpenAI-compatible) client
pub struct OpenRouterClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenRouterClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingKey);
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        })
    }

    pub fn from_config(config: &CreativeConfig, api_key: impl Into<String>) -> Result<Self, LlmError> {
        Self::new(config.api_base_url.clone(), config.model.clone(), api_key)
    }

    fn request<'a>(&'a self, prompt: &str, media_ref: Option<&str>, options: &CompletionOptions) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Some(user_message(prompt, media_ref)),
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
        }
    }
}

#[async_trait]
impl LanguageModel for OpenRouterClient {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(
        &self,
        prompt: &str,
        media_ref: Option<&str>,
        options: &CompletionOptions,
    ) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.request(prompt, media_ref, options);

        debug!(
            model = %self.model,
            has_media = media_ref.is_some(),
            prompt_chars = prompt.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .timeout(options.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse completion: {}", e)))?;

        let text = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| LlmError::InvalidResponse("No content in completion".to_string()))?;

        debug!(chars = text.len(), "Received completion");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_shape() {
        assert_eq!(
            user_message("Describe it.", Some("https://x/a.wav")),
            "Audio: https://x/a.wav\n\nDescribe it."
        );
        assert_eq!(user_message("Describe it.", None), "Describe it.");
    }

    #[test]
    fn test_blank_key_rejected() {
        assert!(matches!(
            OpenRouterClient::new("https://openrouter.ai/api/v1", "m", "  "),
            Err(LlmError::MissingKey)
        ));
    }

    #[test]
    fn test_request_body() {
        let client = OpenRouterClient::new("https://openrouter.ai/api/v1/", "google/gemini-2.5-pro", "k").unwrap();
        assert_eq!(client.base_url, "https://openrouter.ai/api/v1");

        let body = serde_json::to_value(client.request("p", Some("https://x"), &CompletionOptions::default())).unwrap();
        assert_eq!(body["model"], "google/gemini-2.5-pro");
        assert_eq!(body["max_tokens"], 1500);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "Audio: https://x\n\np");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_options_from_config() {
        let options = CompletionOptions::from(&CreativeConfig::default());
        assert_eq!(options.max_tokens, 1500);
        assert_eq!(options.timeout, Duration::from_secs(90));
    }
}
