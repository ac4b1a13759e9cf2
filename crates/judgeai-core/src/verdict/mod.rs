//! Verdict parsing and validation.
//!
//! The judge model is asked for a JSON object. Anything it returns is
//! validated against `schema/verdict.schema.json` before a score is
//! accepted; scores are never clamped into range.

mod parser;
mod schema;

pub use parser::{parse_verdict, Verdict, VerdictError};
pub use schema::validate_verdict_schema;
