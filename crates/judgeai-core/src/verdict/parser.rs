//! Parse raw judge output into a [`Verdict`].

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::schema::validate_verdict_schema;

lazy_static! {
    /// Markdown code fence, optionally tagged `json`.
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").unwrap();

    /// `SCORE: 0.85` line (also tolerates `**Score**:`, `=` and exponents).
    static ref SCORE_LINE: Regex = Regex::new(
        r"(?im)^\s*\**score\**\s*[:=]\s*\**\s*(-?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?)"
    )
    .unwrap();

    /// `REASONING: ...` up to the end of the text.
    static ref REASONING_LINE: Regex =
        Regex::new(r"(?ims)^\s*\**reasoning\**\s*[:=]\s*(.+)\z").unwrap();
}

/// Errors from verdict parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VerdictError {
    #[error("Judge returned an empty response")]
    Empty,

    #[error("Judge returned invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Judge verdict failed schema validation: {}", .0.join("; "))]
    SchemaViolation(Vec<String>),

    #[error("Judge response contains no score")]
    MissingScore,

    #[error("Judge score {0} is outside [0.0, 1.0]")]
    ScoreOutOfRange(f64),
}

/// Score and reasoning returned by the judge model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Verdict {
    pub score: f64,
    pub reasoning: String,
}

impl Verdict {
    /// Verdict for texts that are identical without asking a model.
    pub fn exact_match() -> Self {
        Self {
            score: 1.0,
            reasoning: "Texts are identical after whitespace normalization.".to_string(),
        }
    }
}

/// Parse raw model output.
///
/// JSON is preferred. When the response holds no JSON object at all the
/// `SCORE:` / `REASONING:` line format is accepted instead.
pub fn parse_verdict(raw: &str) -> Result<Verdict, VerdictError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(VerdictError::Empty);
    }

    let body = CODE_FENCE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(trimmed);

    match first_object(body) {
        Some(object) => parse_json_verdict(object?),
        None => parse_line_verdict(body),
    }
}

/// First `{` from which a complete JSON object parses. Text after the
/// object is ignored. `None` when the text has no `{` at all; when no
/// candidate parses, the error from the first one.
fn first_object(text: &str) -> Option<Result<serde_json::Value, VerdictError>> {
    let mut first_error = None;

    for (start, _) in text.match_indices('{') {
        let mut values =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        match values.next() {
            Some(Ok(value)) => return Some(Ok(value)),
            Some(Err(e)) => {
                first_error.get_or_insert_with(|| VerdictError::InvalidJson(e.to_string()));
            }
            None => {}
        }
    }

    first_error.map(Err)
}

fn parse_json_verdict(value: serde_json::Value) -> Result<Verdict, VerdictError> {
    // Report range problems directly rather than as a schema message.
    if let Some(score) = value.get("score").and_then(serde_json::Value::as_f64) {
        check_range(score)?;
    } else if value.get("score").is_none() {
        return Err(VerdictError::MissingScore);
    }

    validate_verdict_schema(&value).map_err(VerdictError::SchemaViolation)?;

    serde_json::from_value(value).map_err(|e| VerdictError::InvalidJson(e.to_string()))
}

fn parse_line_verdict(text: &str) -> Result<Verdict, VerdictError> {
    let score = SCORE_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .ok_or(VerdictError::MissingScore)?;
    check_range(score)?;

    let reasoning = REASONING_LINE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    if reasoning.is_empty() {
        tracing::debug!("Line-format verdict has no reasoning");
    }

    Ok(Verdict { score, reasoning })
}

fn check_range(score: f64) -> Result<(), VerdictError> {
    if score.is_nan() || !(0.0..=1.0).contains(&score) {
        return Err(VerdictError::ScoreOutOfRange(score));
    }
    Ok(())
}
