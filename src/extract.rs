//! Best-effort parsing of model replies.
//!
//! Models are asked for "only a JSON array" but routinely wrap it in prose, so
//! the outermost bracketed span is cut out before parsing. After parsing, the
//! payload is checked against the shape the client renders.

use crate::vocab::{Difficulty, QuizQuestion, VocabularyItem};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use thiserror::Error;

static ARRAY_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("valid regex"));

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("No JSON array found in response")]
    NoArray,
    #[error("{0}")]
    Malformed(#[from] serde_json::Error),
    #[error("item {}: {}", .index + 1, .reason)]
    Schema { index: usize, reason: String },
}

impl ExtractError {
    fn schema(index: usize, reason: impl Into<String>) -> Self {
        ExtractError::Schema {
            index,
            reason: reason.into(),
        }
    }

    /// True when the reply parsed as JSON but had the wrong shape.
    pub fn is_schema(&self) -> bool {
        matches!(self, ExtractError::Schema { .. })
    }
}

/// Returns the span from the first `[` to the last `]`, if any.
pub fn array_span(reply: &str) -> Option<&str> {
    ARRAY_SPAN.find(reply).map(|m| m.as_str())
}

pub fn parse_array(reply: &str) -> Result<Vec<Value>, ExtractError> {
    let span = array_span(reply).ok_or(ExtractError::NoArray)?;
    let values: Vec<Value> = serde_json::from_str(span)?;
    Ok(values)
}

/// Parses a vocabulary reply.
///
/// Entries without a word or meaning are dropped, strings are trimmed and a
/// missing difficulty becomes Medium. Non-object entries and fields of the
/// wrong JSON type are schema errors.
pub fn parse_vocabulary(reply: &str) -> Result<Vec<VocabularyItem>, ExtractError> {
    let values = parse_array(reply)?;
    let mut vocabulary = Vec::with_capacity(values.len());
    for (index, value) in values.iter().enumerate() {
        let object = as_object(value, index)?;
        let word = optional_text(object, "word", index)?;
        let meaning = optional_text(object, "meaning", index)?;
        let (Some(word), Some(meaning)) = (word, meaning) else {
            continue;
        };
        let (word, meaning) = (word.trim(), meaning.trim());
        if word.is_empty() || meaning.is_empty() {
            continue;
        }
        let difficulty = match optional_text(object, "difficulty", index)? {
            Some(label) if !label.is_empty() => Difficulty::from(label.to_string()),
            _ => Difficulty::Medium,
        };
        vocabulary.push(VocabularyItem::new(word, meaning, difficulty));
    }
    Ok(vocabulary)
}

/// Parses a quiz reply, rejecting any question the client could not render.
pub fn parse_quiz(reply: &str) -> Result<Vec<QuizQuestion>, ExtractError> {
    let values = parse_array(reply)?;
    values
        .iter()
        .enumerate()
        .map(|(index, value)| quiz_question(value, index))
        .collect()
}

fn quiz_question(value: &Value, index: usize) -> Result<QuizQuestion, ExtractError> {
    let object = as_object(value, index)?;
    let question = optional_text(object, "question", index)?
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ExtractError::schema(index, "missing question text"))?;

    let options = object
        .get("options")
        .and_then(Value::as_array)
        .ok_or_else(|| ExtractError::schema(index, "missing options array"))?;
    if options.len() != QuizQuestion::OPTION_COUNT {
        return Err(ExtractError::schema(
            index,
            format!(
                "expected {} options, found {}",
                QuizQuestion::OPTION_COUNT,
                options.len()
            ),
        ));
    }
    let options = options
        .iter()
        .map(|option| {
            option
                .as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| ExtractError::schema(index, "options must be strings"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let answer = object
        .get("answer")
        .and_then(answer_index)
        .ok_or_else(|| ExtractError::schema(index, "answer must be a non-negative integer"))?;
    if answer >= QuizQuestion::OPTION_COUNT as u64 {
        return Err(ExtractError::schema(
            index,
            format!("answer index {answer} out of range 0-3"),
        ));
    }

    Ok(QuizQuestion {
        question: question.to_string(),
        options,
        answer: answer as usize,
    })
}

/// Integer index; integral floats such as `1.0` are accepted too.
fn answer_index(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| {
        value
            .as_f64()
            .filter(|n| n.fract() == 0.0 && *n >= 0.0)
            .map(|n| n as u64)
    })
}

fn as_object(value: &Value, index: usize) -> Result<&Map<String, Value>, ExtractError> {
    value
        .as_object()
        .ok_or_else(|| ExtractError::schema(index, "expected a JSON object"))
}

/// Missing and `null` fields read as `None`; any non-string value is an error.
fn optional_text<'a>(
    object: &'a Map<String, Value>,
    field: &str,
    index: usize,
) -> Result<Option<&'a str>, ExtractError> {
    match object.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.as_str())),
        Some(_) => Err(ExtractError::schema(
            index,
            format!("field `{field}` must be a string"),
        )),
    }
}
