//! Prompts sent to the judge model.
//!
//! The system prompt is fixed so that providers with prompt caching can
//! reuse it across calls. Only the user prompt varies with the inputs.

use thiserror::Error;

/// Placeholder replaced with the actual text.
pub const ACTUAL_PLACEHOLDER: &str = "{actual}";

/// Placeholder replaced with the expected text.
pub const EXPECTED_PLACEHOLDER: &str = "{expected}";

/// System prompt shared by every evaluation.
pub const JUDGE_SYSTEM_PROMPT: &str = r#"
You are a semantic alignment judge.

You compare an ACTUAL text against an EXPECTED text and decide how closely
their meanings agree. You do not grade style, grammar, length or tone.

## Scoring
- 1.0: Same meaning. Paraphrases, synonyms and reordering do not lower the score.
- 0.7 - 0.9: Same core meaning, minor details missing or added.
- 0.4 - 0.6: Partially aligned. Some key facts agree, others differ.
- 0.1 - 0.3: Mostly different meaning with a shared topic.
- 0.0: Contradictory or unrelated.

Numbers, negations and outcomes matter: "succeeded with 95%" and
"failed with 30%" contradict each other.

## Output Format (JSON only, no prose outside the object)
{
  "score": 0.0-1.0,
  "reasoning": "one or two sentences explaining the score"
}
"#;

/// Default user prompt.
pub const DEFAULT_USER_TEMPLATE: &str = r#"EXPECTED:
"""
{expected}
"""

ACTUAL:
"""
{actual}
"""

Return the JSON verdict for how well ACTUAL aligns with EXPECTED."#;

/// Errors from prompt templates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PromptError {
    #[error("Prompt template is missing placeholder {0}")]
    MissingPlaceholder(&'static str),
}

/// User prompt template with `{actual}` and `{expected}` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    /// Create a custom template. Both placeholders must be present.
    pub fn new(template: impl Into<String>) -> Result<Self, PromptError> {
        let template = template.into();
        if !template.contains(ACTUAL_PLACEHOLDER) {
            return Err(PromptError::MissingPlaceholder(ACTUAL_PLACEHOLDER));
        }
        if !template.contains(EXPECTED_PLACEHOLDER) {
            return Err(PromptError::MissingPlaceholder(EXPECTED_PLACEHOLDER));
        }
        Ok(Self { template })
    }

    /// Raw template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Render the user prompt.
    ///
    /// Both placeholders are substituted in one pass, so an input that
    /// itself contains `{expected}` is not expanded a second time.
    pub fn render(&self, actual: &str, expected: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + actual.len() + expected.len());
        let mut rest = self.template.as_str();

        loop {
            let next_actual = rest.find(ACTUAL_PLACEHOLDER);
            let next_expected = rest.find(EXPECTED_PLACEHOLDER);

            let (idx, placeholder, value) = match (next_actual, next_expected) {
                (Some(a), Some(e)) if a < e => (a, ACTUAL_PLACEHOLDER, actual),
                (Some(_), Some(e)) => (e, EXPECTED_PLACEHOLDER, expected),
                (Some(a), None) => (a, ACTUAL_PLACEHOLDER, actual),
                (None, Some(e)) => (e, EXPECTED_PLACEHOLDER, expected),
                (None, None) => break,
            };

            out.push_str(&rest[..idx]);
            out.push_str(value);
            rest = &rest[idx + placeholder.len()..];
        }

        out.push_str(rest);
        out
    }
}
