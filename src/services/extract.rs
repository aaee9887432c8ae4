//! Recovers a `NutritionEstimate` from free-text model output.
//!
//! The reply may wrap the JSON in prose or markdown fences. The scanner takes
//! the first `{` and walks to its matching `}`, skipping braces that sit
//! inside JSON string literals, then hands that span to serde_json.

use serde_json::{Map, Value};

use super::error::ParseError;
use crate::models::NutritionEstimate;

const TEXT_FIELDS: [&str; 4] = ["calories", "protein", "carbs", "fat"];

/// Byte span of the first balanced `{...}` in `text`.
pub fn find_json_object(text: &str) -> Result<&str, ParseError> {
    let start = text.find('{').ok_or(ParseError::NoJsonObject)?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Ok(&text[start..end]);
                }
            }
            _ => {}
        }
    }

    Err(ParseError::UnterminatedObject)
}

pub fn parse_nutrition(reply: &str) -> Result<NutritionEstimate, ParseError> {
    let span = find_json_object(reply)?;
    let value: Value =
        serde_json::from_str(span).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

    let object = value.as_object().ok_or(ParseError::NotAnObject)?;

    let [calories, protein, carbs, fat] = TEXT_FIELDS.map(|field| text_field(object, field));

    Ok(NutritionEstimate {
        calories: calories?,
        protein: protein?,
        carbs: carbs?,
        fat: fat?,
        score: score_field(object)?,
    })
}

fn text_field(object: &Map<String, Value>, field: &'static str) -> Result<String, ParseError> {
    match object.get(field) {
        None | Some(Value::Null) => Err(ParseError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        // Models sometimes drop the quotes around plain numbers
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(ParseError::InvalidField {
            field,
            reason: format!("expected text, got {}", json_type(other)),
        }),
    }
}

fn score_field(object: &Map<String, Value>) -> Result<u8, ParseError> {
    let raw = match object.get("score") {
        None | Some(Value::Null) => return Err(ParseError::MissingField("score")),
        Some(v) => v,
    };

    let score = match raw {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i
            } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.is_finite()) {
                if f > i64::MAX as f64 || f < i64::MIN as f64 {
                    return Err(ParseError::InvalidField {
                        field: "score",
                        reason: format!("{} is not a representable integer", n),
                    });
                }
                f as i64
            } else {
                return Err(ParseError::InvalidField {
                    field: "score",
                    reason: format!("{} is not an integer", n),
                });
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| ParseError::InvalidField {
            field: "score",
            reason: format!("{:?} is not an integer", s),
        })?,
        other => {
            return Err(ParseError::InvalidField {
                field: "score",
                reason: format!("expected integer, got {}", json_type(other)),
            })
        }
    };

    u8::try_from(score)
        .ok()
        .filter(|s| *s <= 100)
        .ok_or(ParseError::ScoreOutOfRange(score))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
