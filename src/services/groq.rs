use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::RelayError;
use crate::config::Config;
use crate::models::ChatMessage;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<ProviderError>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    message: Option<String>,
}

/// Source of raw chat completions. The relay endpoint passes whatever this
/// returns straight back to its caller.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<serde_json::Value, RelayError>;
}

/// Upstream chat-completion client (Groq, OpenAI-compatible API).
pub struct GroqClient {
    api_key: String,
    model: String,
    temperature: f32,
    api_url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl GroqClient {
    pub fn from_config(config: &Config, api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            api_url: config.api_url.clone(),
            timeout: config.timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl CompletionProvider for GroqClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<serde_json::Value, RelayError> {
        if messages.is_empty() {
            return Err(RelayError::InvalidRequest("message list is empty".to_string()));
        }

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature: self.temperature,
        };

        log::info!("🤖 Forwarding {} messages to Groq with model: {}", messages.len(), self.model);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RelayError::Timeout(self.timeout)
                } else {
                    RelayError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        log::info!("📥 Groq response status: {}", status);

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            log::error!("❌ Groq API error ({}): {}", status, error_text);
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                message: provider_error_message(&error_text),
            });
        }

        let response_text = response.text().await?;
        log::debug!("📄 Raw Groq response size: {} bytes", response_text.len());

        serde_json::from_str(&response_text).map_err(|e| RelayError::MalformedCompletion(e.to_string()))
    }
}

/// `error.message` from a provider failure body, or a generic text.
fn provider_error_message(body: &str) -> String {
    serde_json::from_str::<ProviderErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .and_then(|e| e.message)
        .unwrap_or_else(|| "Groq request failed".to_string())
}
