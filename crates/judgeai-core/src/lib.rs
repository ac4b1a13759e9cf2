//! # judgeai-core
//!
//! Deterministic building blocks for LLM-as-a-judge semantic evaluation.
//!
//! This crate answers everything about an evaluation that does not need
//! a network call:
//! - What the judge is asked (prompts)
//! - Whether what it answered is usable (verdict parsing and schema validation)
//! - What the caller gets back (`DriftResult`, `BatchSummary`)
//!
//! ## Key Guarantees
//!
//! 1. **No I/O**: nothing here talks to a model provider
//! 2. **Strict scores**: a verdict outside `[0.0, 1.0]` is an error, never clamped
//! 3. **Caller metadata is preserved**: runtime keys never overwrite caller keys
//!
//! ## Example
//!
//! ```rust
//! use judgeai_core::{parse_verdict, PromptTemplate};
//!
//! let prompt = PromptTemplate::default().render(
//!     "The ML model reached 95% test accuracy",
//!     "The machine learning model achieved 95% accuracy on the test dataset",
//! );
//! assert!(prompt.contains("95%"));
//!
//! let verdict = parse_verdict(r#"{"score": 0.93, "reasoning": "Paraphrase."}"#).unwrap();
//! assert_eq!(verdict.score, 0.93);
//! ```

pub mod exact;
pub mod prompt;
pub mod types;
pub mod verdict;

pub use exact::{is_exact_match, normalize_whitespace};
pub use prompt::{PromptError, PromptTemplate, JUDGE_SYSTEM_PROMPT};
pub use types::{
    keys, merge_metadata, BatchSummary, DriftResult, EvaluationPair, Metadata, PairsError,
};
pub use verdict::{parse_verdict, validate_verdict_schema, Verdict, VerdictError};

/// Crate version, as published.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
