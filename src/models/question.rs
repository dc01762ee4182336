use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: Uuid,
    pub test_id: Uuid,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub image_url: Option<String>,
    pub marks: i32,
    pub position: i32,
    pub choices: Option<JsonValue>,
    pub correct_answer: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "question_type", rename_all = "snake_case")]
pub enum QuestionType {
    Mcq,
    Single,
    Text,
    Number,
}

impl QuestionType {
    pub fn needs_choices(self) -> bool {
        matches!(self, QuestionType::Mcq | QuestionType::Single)
    }
}

/// Raised when a stored key or a submitted answer cannot be read as any of
/// the accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("unsupported value in answer list: {0}")]
    ListElement(String),
    #[error("unsupported answer shape: {0}")]
    Unsupported(String),
}

/// Answer key as stored on a question, resolved from whichever JSON shape
/// it was written in (`{value: ..}`, legacy `{options: [..]}`, bare array or
/// bare scalar).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerKey {
    Scalar(String),
    Set(Vec<String>),
}

impl AnswerKey {
    pub fn from_json(raw: &JsonValue) -> Result<Option<Self>, ShapeError> {
        let inner = match raw {
            JsonValue::Object(map) => match (map.get("value"), map.get("options")) {
                (Some(value), _) => value,
                (None, Some(options)) => options,
                (None, None) => return Err(ShapeError::Unsupported(raw.to_string())),
            },
            other => other,
        };

        match inner {
            JsonValue::Null => Ok(None),
            JsonValue::Array(items) => Ok(Some(AnswerKey::Set(list_of_strings(items)?))),
            JsonValue::Object(_) => Err(ShapeError::Unsupported(inner.to_string())),
            scalar => Ok(scalar_text(scalar).map(AnswerKey::Scalar)),
        }
    }

    /// Canonical stored form: `{ "value": <string | [string]> }`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            AnswerKey::Scalar(value) => serde_json::json!({ "value": value }),
            AnswerKey::Set(values) => serde_json::json!({ "value": values }),
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            AnswerKey::Scalar(value) => vec![value.clone()],
            AnswerKey::Set(values) => values.clone(),
        }
    }

    pub fn first(&self) -> Option<String> {
        match self {
            AnswerKey::Scalar(value) => Some(value.clone()),
            AnswerKey::Set(values) => values.first().cloned(),
        }
    }
}

/// A candidate's submitted answer payload.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerValue {
    Text(String),
    Number(String),
    List(Vec<String>),
}

impl AnswerValue {
    pub fn from_json(raw: &JsonValue) -> Result<Option<Self>, ShapeError> {
        match raw {
            JsonValue::Null => Ok(None),
            JsonValue::Array(items) => Ok(Some(AnswerValue::List(list_of_strings(items)?))),
            JsonValue::Number(n) => Ok(Some(AnswerValue::Number(number_text(n)))),
            JsonValue::String(s) => Ok(Some(AnswerValue::Text(s.clone()))),
            JsonValue::Bool(b) => Ok(Some(AnswerValue::Text(b.to_string()))),
            JsonValue::Object(_) => Err(ShapeError::Unsupported(raw.to_string())),
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            AnswerValue::Text(s) | AnswerValue::Number(s) => vec![s.clone()],
            AnswerValue::List(items) => items.clone(),
        }
    }

    pub fn first(&self) -> Option<String> {
        match self {
            AnswerValue::Text(s) | AnswerValue::Number(s) => Some(s.clone()),
            AnswerValue::List(items) => items.first().cloned(),
        }
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(number_text(n)),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Whole floats render without a fraction: `4.0` -> `"4"`, `2.5` -> `"2.5"`.
fn number_text(n: &serde_json::Number) -> String {
    match n.as_f64() {
        Some(f) if n.is_f64() && f.is_finite() && f.fract() == 0.0 => format!("{:.0}", f),
        _ => n.to_string(),
    }
}

fn list_of_strings(items: &[JsonValue]) -> Result<Vec<String>, ShapeError> {
    items
        .iter()
        .map(|item| scalar_text(item).ok_or_else(|| ShapeError::ListElement(item.to_string())))
        .collect()
}

impl Question {
    /// Resolves the stored key. `Ok(None)` means the question defines no key.
    pub fn answer_key(&self) -> Result<Option<AnswerKey>, ShapeError> {
        match &self.correct_answer {
            Some(raw) => AnswerKey::from_json(raw),
            None => Ok(None),
        }
    }

    pub fn choice_list(&self) -> Vec<String> {
        self.choices
            .as_ref()
            .and_then(|c| serde_json::from_value::<Vec<String>>(c.clone()).ok())
            .unwrap_or_default()
    }
}
