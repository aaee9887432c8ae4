use serde::{Deserialize, Serialize};

use crate::services::error::{AnalysisError, RelayError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One entry of a conversation sent to the relay. Order matters: system
/// first, then history, then the latest user turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// Chat-completion envelope as returned by the relay (OpenAI-compatible).
#[derive(Debug, Clone, Deserialize)]
pub struct Completion {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: CompletionMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionMessage {
    pub role: Option<Role>,
    pub content: Option<String>,
}

impl Completion {
    pub fn from_value(value: serde_json::Value) -> Result<Self, RelayError> {
        serde_json::from_value(value)
            .map_err(|e| RelayError::MalformedCompletion(e.to_string()))
    }

    /// Text of the first candidate message.
    pub fn reply_text(&self) -> Result<&str, RelayError> {
        let choice = self
            .choices
            .first()
            .ok_or_else(|| RelayError::MalformedCompletion("no choices in completion".to_string()))?;

        if let Some(role) = choice.message.role.filter(|r| *r != Role::Assistant) {
            return Err(RelayError::MalformedCompletion(format!(
                "first choice has role {:?}, expected assistant",
                role
            )));
        }

        choice
            .message
            .content
            .as_deref()
            .ok_or_else(|| RelayError::MalformedCompletion("first choice has no content".to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationVerdict {
    Food,
    NotFood,
}

/// Nutrition estimate recovered from a model reply. Every field is required;
/// `services::extract::parse_nutrition` only returns one for a complete object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NutritionEstimate {
    pub calories: String,
    pub protein: String,
    pub carbs: String,
    pub fat: String,
    pub score: u8,
}

#[derive(Debug)]
pub enum AnalysisOutcome {
    NotFood,
    Success(NutritionEstimate),
    Error(AnalysisError),
}

pub const NOT_FOOD_MESSAGE: &str =
    "This doesn't look like food. Please upload a photo of a meal or a food item.";
pub const TRY_AGAIN_MESSAGE: &str =
    "We couldn't analyze this item right now. Please try again.";

impl AnalysisOutcome {
    /// Text shown to the user for the terminal outcome.
    pub fn user_message(&self) -> String {
        match self {
            AnalysisOutcome::NotFood => NOT_FOOD_MESSAGE.to_string(),
            AnalysisOutcome::Success(estimate) => format!(
                "Calories: {} | Protein: {} | Carbs: {} | Fat: {} | Health score: {}/100",
                estimate.calories, estimate.protein, estimate.carbs, estimate.fat, estimate.score
            ),
            AnalysisOutcome::Error(_) => TRY_AGAIN_MESSAGE.to_string(),
        }
    }
}

impl Serialize for AnalysisOutcome {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(None)?;
        match self {
            AnalysisOutcome::NotFood => {
                map.serialize_entry("status", "not_food")?;
                map.serialize_entry("message", NOT_FOOD_MESSAGE)?;
            }
            AnalysisOutcome::Success(estimate) => {
                map.serialize_entry("status", "success")?;
                map.serialize_entry("data", estimate)?;
            }
            AnalysisOutcome::Error(err) => {
                map.serialize_entry("status", "error")?;
                map.serialize_entry("error", &err.to_string())?;
                map.serialize_entry("message", TRY_AGAIN_MESSAGE)?;
            }
        }
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BmiCategory {
    Underweight,
    #[serde(rename = "Normal Weight")]
    Normal,
    Overweight,
    Obese,
}

impl std::fmt::Display for BmiCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal Weight",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BmiReport {
    pub bmi: f64,
    pub category: BmiCategory,
    pub advice: String,
}
