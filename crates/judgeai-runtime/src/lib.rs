//! # judgeai-runtime
//!
//! LLM-backed semantic evaluation for JudgeAI.
//!
//! `judgeai-core` decides what the judge is asked and whether its answer
//! is usable. This crate makes the call: provider selection, credentials,
//! timeouts, retries, caching and token accounting.
//!
//! ## Example
//!
//! ```rust,ignore
//! use judgeai_runtime::SemanticJudge;
//!
//! let judge = SemanticJudge::new("gpt-4o-mini", 0.0)?;
//!
//! let result = judge
//!     .evaluate("The system works correctly", "The system functions properly", None)
//!     .await?;
//! println!("{:.3} {}", result.score, result.reasoning);
//!
//! let results = judge
//!     .batch_evaluate(vec![
//!         ("Error occurred during processing", "Processing completed successfully"),
//!         ("User authentication passed", "User login was successful"),
//!     ])
//!     .await?;
//! ```

use thiserror::Error;

pub mod cache;
pub mod config;
mod judge;
pub mod providers;
pub mod resilience;

pub use cache::{CacheKey, CachedVerdict, VerdictCache};
pub use config::{CacheConfig, ConfigError, ConfigSecret, JudgeConfig};
pub use judge::{SemanticJudge, SemanticJudgeBuilder};
pub use providers::{LlmProvider, ProviderError, ProviderRegistry};
pub use resilience::{CircuitBreakerConfig, LlmUsage, RetryPolicy};

/// Errors from the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Unusable verdict: {0}")]
    Verdict(#[from] judgeai_core::VerdictError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid prompt template: {0}")]
    Prompt(#[from] judgeai_core::PromptError),

    #[error("Circuit open for provider '{0}'")]
    CircuitOpen(String),

    #[error("Token budget exceeded: need ~{needed}, {remaining} remaining")]
    BudgetExceeded { needed: u64, remaining: u64 },
}

impl RuntimeError {
    /// Whether the error came from missing or rejected credentials.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            RuntimeError::Provider(ProviderError::AuthError | ProviderError::NotConfigured(_))
        )
    }
}
