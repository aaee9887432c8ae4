use std::env;
use std::time::Duration;

use crate::services::error::ConfigError;

pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_API_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_RELAY_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_RELAY_URL: &str = "http://localhost:3001/api/chat";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub api_url: String,
    pub relay_addr: String,
    pub relay_url: String,
    pub timeout: Duration,
}

impl Config {
    /// Reads configuration from the process environment (after `.env` has been loaded).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // VITE_ prefix is what the front-end build uses
        let api_key = lookup("GROQ_API_KEY")
            .or_else(|| lookup("VITE_GROQ_API_KEY"))
            .filter(|k| !k.trim().is_empty());

        let temperature = match lookup("GROQ_TEMPERATURE") {
            Some(raw) => {
                let value: f32 = raw.trim().parse().map_err(|e: std::num::ParseFloatError| {
                    ConfigError::InvalidValue {
                        key: "GROQ_TEMPERATURE",
                        value: raw.clone(),
                        reason: e.to_string(),
                    }
                })?;
                if !(0.0..=2.0).contains(&value) {
                    return Err(ConfigError::InvalidValue {
                        key: "GROQ_TEMPERATURE",
                        value: raw,
                        reason: "must be between 0.0 and 2.0".to_string(),
                    });
                }
                value
            }
            None => DEFAULT_TEMPERATURE,
        };

        let timeout_secs = match lookup("RELAY_TIMEOUT_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "RELAY_TIMEOUT_SECS",
                        value: raw,
                        reason: "must be a positive number of seconds".to_string(),
                    })
                }
            },
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key,
            model: lookup("GROQ_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            temperature,
            api_url: lookup("GROQ_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            relay_addr: lookup("RELAY_ADDR").unwrap_or_else(|| DEFAULT_RELAY_ADDR.to_string()),
            relay_url: lookup("RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .ok_or(ConfigError::MissingCredential { key: "GROQ_API_KEY" })
    }
}
