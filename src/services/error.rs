use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} must be set in the environment or .env file")]
    MissingCredential { key: &'static str },

    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Failure of a single relay round-trip.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("relay request rejected: {0}")]
    InvalidRequest(String),

    #[error("relay transport failure: {0}")]
    Transport(String),

    #[error("relay call timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("malformed completion: {0}")]
    MalformedCompletion(String),
}

impl From<reqwest::Error> for RelayError {
    fn from(e: reqwest::Error) -> Self {
        RelayError::Transport(e.to_string())
    }
}

/// The assistant reply could not be turned into a `NutritionEstimate`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("reply contains no JSON object")]
    NoJsonObject,

    #[error("JSON object in reply is never closed")]
    UnterminatedObject,

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("JSON value is not an object")]
    NotAnObject,

    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("invalid field `{field}`: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("score {0} is outside 0..=100")]
    ScoreOutOfRange(i64),
}

#[derive(Debug, Clone, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("scan session is not idle; reset it before starting a new scan")]
    NotIdle,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BmiError {
    #[error("height and weight must be positive numbers")]
    InvalidMeasurement,
}
