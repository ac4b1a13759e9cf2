//! Data types shared by the core and the runtime.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Errors from loading batch pair files.
#[derive(Error, Debug)]
pub enum PairsError {
    #[error("Failed to read pairs file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Caller-supplied and runtime-reported metadata.
///
/// BTreeMap keeps serialized output stable across runs.
pub type Metadata = BTreeMap<String, JsonValue>;

/// Metadata keys written by the runtime.
///
/// A caller key with the same name always wins; see [`merge_metadata`].
pub mod keys {
    pub const MODEL: &str = "model";
    pub const PROVIDER: &str = "provider";
    pub const TEMPERATURE: &str = "temperature";
    pub const TOKENS_USED: &str = "tokens_used";
    pub const PROMPT_TOKENS: &str = "prompt_tokens";
    pub const COMPLETION_TOKENS: &str = "completion_tokens";
    pub const LATENCY_MS: &str = "latency_ms";
    pub const CACHED: &str = "cached";
    pub const EXACT_MATCH: &str = "exact_match";

    /// All reserved keys, in the order they are documented.
    pub const RESERVED: [&str; 9] = [
        MODEL,
        PROVIDER,
        TEMPERATURE,
        TOKENS_USED,
        PROMPT_TOKENS,
        COMPLETION_TOKENS,
        LATENCY_MS,
        CACHED,
        EXACT_MATCH,
    ];
}

/// Merge runtime metadata underneath caller metadata.
///
/// Caller entries are copied verbatim. Runtime entries are only added
/// when the caller did not already use the key.
pub fn merge_metadata(caller: Option<Metadata>, runtime: Metadata) -> Metadata {
    let mut merged = caller.unwrap_or_default();
    for (key, value) in runtime {
        merged.entry(key).or_insert(value);
    }
    merged
}

/// Result of judging one (actual, expected) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriftResult {
    /// Alignment score in `[0.0, 1.0]`; 1.0 means same meaning
    pub score: f64,

    /// Judge's explanation for the score
    pub reasoning: String,

    /// Caller metadata plus runtime-reported entries
    #[serde(default)]
    pub metadata: Metadata,

    /// The text that was produced
    pub actual: String,

    /// The text it was compared against
    pub expected: String,

    /// When the result was produced
    pub evaluated_at: DateTime<Utc>,
}

impl DriftResult {
    /// Create a result stamped with the current time.
    pub fn new(
        score: f64,
        reasoning: impl Into<String>,
        actual: impl Into<String>,
        expected: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        Self {
            score,
            reasoning: reasoning.into(),
            metadata,
            actual: actual.into(),
            expected: expected.into(),
            evaluated_at: Utc::now(),
        }
    }

    /// Semantic drift, the complement of the alignment score.
    pub fn drift(&self) -> f64 {
        1.0 - self.score
    }

    /// Tokens the provider reported for this evaluation, if any.
    pub fn tokens_used(&self) -> Option<u64> {
        self.metadata.get(keys::TOKENS_USED).and_then(JsonValue::as_u64)
    }

    /// Whether the result was served from the verdict cache.
    pub fn is_cached(&self) -> bool {
        self.metadata
            .get(keys::CACHED)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }
}

/// One pair to evaluate, as found in batch files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvaluationPair {
    pub actual: String,
    pub expected: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl EvaluationPair {
    pub fn new(actual: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            actual: actual.into(),
            expected: expected.into(),
            metadata: None,
        }
    }

    /// Attach caller metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Load a list of pairs from a YAML or JSON string.
    ///
    /// YAML is a superset of JSON, so one parser covers both.
    pub fn list_from_str(input: &str) -> Result<Vec<Self>, PairsError> {
        let pairs: Vec<Self> = serde_yaml::from_str(input)?;
        Ok(pairs)
    }

    /// Load a list of pairs from a `.yaml`, `.yml` or `.json` file.
    pub fn list_from_file(path: impl AsRef<Path>) -> Result<Vec<Self>, PairsError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(serde_json::from_str(&content)?),
            _ => Self::list_from_str(&content),
        }
    }
}

impl<A, E> From<(A, E)> for EvaluationPair
where
    A: Into<String>,
    E: Into<String>,
{
    fn from((actual, expected): (A, E)) -> Self {
        Self::new(actual, expected)
    }
}

/// Aggregate statistics over a batch of results.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSummary {
    pub count: usize,
    pub mean_score: Option<f64>,
    pub min_score: Option<f64>,
    pub max_score: Option<f64>,
    pub mean_drift: Option<f64>,
    pub total_tokens: u64,
    pub cached: usize,
}

impl BatchSummary {
    /// Summarize a slice of results. An empty slice has no score statistics.
    pub fn from_results(results: &[DriftResult]) -> Self {
        let count = results.len();
        let total_tokens = results.iter().filter_map(DriftResult::tokens_used).sum();
        let cached = results.iter().filter(|r| r.is_cached()).count();

        if count == 0 {
            return Self {
                count,
                mean_score: None,
                min_score: None,
                max_score: None,
                mean_drift: None,
                total_tokens,
                cached,
            };
        }

        let sum: f64 = results.iter().map(|r| r.score).sum();
        let mean = sum / count as f64;
        let min = results.iter().map(|r| r.score).fold(f64::INFINITY, f64::min);
        let max = results
            .iter()
            .map(|r| r.score)
            .fold(f64::NEG_INFINITY, f64::max);

        Self {
            count,
            mean_score: Some(mean),
            min_score: Some(min),
            max_score: Some(max),
            mean_drift: Some(1.0 - mean),
            total_tokens,
            cached,
        }
    }
}
