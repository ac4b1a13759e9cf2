//! Resilience patterns for judgeai-runtime.
//!
//! - Retry with exponential backoff
//! - Circuit breaker to fail fast while a provider is down
//! - Token budget and usage accounting

mod budget;
mod circuit_breaker;
mod retry;

pub use budget::{BudgetTracker, LlmUsage, Reservation, TokenBudget};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{with_retry, RetryPolicy};
