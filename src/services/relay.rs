use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::error::RelayError;
use super::groq::CompletionProvider;
use crate::models::{ChatMessage, Completion};

pub const MISSING_KEY_MESSAGE: &str = "Server configuration error: Missing API Key";

/// Anything that can carry a conversation to the model and hand back a completion.
#[async_trait::async_trait]
pub trait RelayClient: Send + Sync {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Completion, RelayError>;
}

#[derive(Debug, Serialize)]
struct RelayRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct RelayErrorBody {
    error: Option<String>,
}

/// Client for the relay's `POST /api/chat` endpoint.
pub struct HttpRelayClient {
    url: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpRelayClient {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            client: reqwest::Client::new(),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> RelayError {
        if e.is_timeout() {
            RelayError::Timeout(self.timeout)
        } else {
            RelayError::Transport(e.to_string())
        }
    }
}

#[async_trait::async_trait]
impl RelayClient for HttpRelayClient {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Completion, RelayError> {
        if messages.is_empty() {
            return Err(RelayError::InvalidRequest("message list is empty".to_string()));
        }

        log::debug!("📤 Sending {} messages to relay at {}", messages.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&RelayRequest { messages })
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        log::debug!("📥 Relay response status: {}", status);

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = upstream_error_message(&body)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("relay request failed").to_string());
            log::error!("❌ Relay error ({}): {}", status, message);
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| RelayError::MalformedCompletion(e.to_string()))?;

        Completion::from_value(value)
    }
}

/// Calls a completion provider in the same process instead of going over HTTP.
/// Without a provider (no credential configured) every call fails the same way
/// the relay endpoint does.
pub struct ProviderRelay {
    provider: Option<Arc<dyn CompletionProvider>>,
}

impl ProviderRelay {
    pub fn new(provider: Option<Arc<dyn CompletionProvider>>) -> Self {
        Self { provider }
    }
}

#[async_trait::async_trait]
impl RelayClient for ProviderRelay {
    async fn invoke(&self, messages: &[ChatMessage]) -> Result<Completion, RelayError> {
        let provider = self.provider.as_ref().ok_or_else(|| RelayError::Upstream {
            status: 500,
            message: MISSING_KEY_MESSAGE.to_string(),
        })?;

        let value = provider.complete(messages).await?;
        Completion::from_value(value)
    }
}

/// Pulls the `error` text out of a relay failure body, if there is one.
fn upstream_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<RelayErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .filter(|m| !m.trim().is_empty())
}

#[cfg(test)]
pub use testing::ScriptedRelay;
