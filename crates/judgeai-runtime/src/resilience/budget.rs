//! Token budget and usage accounting.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::providers::TokenUsage;

/// Token budget shared by every evaluation of one judge.
pub struct TokenBudget {
    /// Maximum tokens allowed
    pub max_tokens: u64,

    used: AtomicU64,
}

impl TokenBudget {
    pub fn new(max_tokens: u64) -> Self {
        Self {
            max_tokens,
            used: AtomicU64::new(0),
        }
    }

    /// Check if we can afford to use tokens.
    pub fn can_afford(&self, tokens: u64) -> bool {
        self.remaining() >= tokens
    }

    pub fn record(&self, tokens: u64) {
        self.used.fetch_add(tokens, Ordering::SeqCst);
    }

    /// Atomically claim `tokens` if they fit. On `false` nothing changed.
    pub fn try_reserve(&self, tokens: u64) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                used.checked_add(tokens)
                    .filter(|next| *next <= self.max_tokens)
            })
            .is_ok()
    }

    /// Return an unused reservation.
    pub fn release(&self, tokens: u64) {
        // Closure always returns Some, so this cannot fail.
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_sub(tokens))
            });
    }

    /// Replace a reservation with what the call actually spent.
    pub fn settle(&self, reserved: u64, actual: u64) {
        if actual >= reserved {
            self.record(actual - reserved);
        } else {
            self.release(reserved - actual);
        }
    }

    pub fn remaining(&self) -> u64 {
        self.max_tokens.saturating_sub(self.used())
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.used.store(0, Ordering::SeqCst);
    }
}

/// Accumulated LLM usage for a judge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Total tokens used
    pub total_tokens: u64,

    /// Prompt/input tokens
    pub prompt_tokens: u64,

    /// Completion/output tokens
    pub completion_tokens: u64,

    /// Number of LLM calls made
    pub llm_calls: u64,

    /// Evaluations answered from the verdict cache
    pub cache_hits: u64,

    /// Evaluations answered by the exact-match shortcut
    pub exact_matches: u64,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += u64::from(usage.prompt_tokens);
        self.completion_tokens += u64::from(usage.completion_tokens);
        self.total_tokens += u64::from(usage.total());
        self.llm_calls += 1;
        self.estimated_cost += Self::estimate_cost(usage, model);
    }

    /// Estimate cost for a usage entry.
    fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
        // USD per million tokens: (input, output, cache write, cache read)
        let (input_rate, output_rate, cache_write_rate, cache_read_rate) = match model {
            m if m.contains("gpt-4o-mini") => (0.15, 0.6, 0.0, 0.075),
            m if m.contains("gpt-4o") => (2.5, 10.0, 0.0, 1.25),
            m if m.contains("gpt-4.1-mini") => (0.4, 1.6, 0.0, 0.1),
            m if m.contains("sonnet-4-5") => (3.0, 15.0, 3.75, 0.3),
            m if m.contains("haiku-4-5") => (1.0, 5.0, 1.25, 0.1),
            m if m.contains("opus-4-5") => (5.0, 25.0, 6.25, 0.5),
            _ => (0.15, 0.6, 0.0, 0.0), // gpt-4o-mini pricing
        };

        let per_million = |tokens: u32, rate: f64| tokens as f64 / 1_000_000.0 * rate;

        per_million(usage.prompt_tokens, input_rate)
            + per_million(usage.completion_tokens, output_rate)
            + per_million(usage.cache_creation_tokens, cache_write_rate)
            + per_million(usage.cache_read_tokens, cache_read_rate)
    }
}

/// Tracks spend against an optional global budget.
pub struct BudgetTracker {
    budget: Option<TokenBudget>,
    usage: RwLock<LlmUsage>,
}

impl BudgetTracker {
    /// `None` means unlimited.
    pub fn new(max_tokens: Option<u64>) -> Self {
        Self {
            budget: max_tokens.map(TokenBudget::new),
            usage: RwLock::new(LlmUsage::default()),
        }
    }

    /// Check whether an estimated call still fits.
    pub fn can_afford(&self, estimated_tokens: u64) -> bool {
        self.budget
            .as_ref()
            .map_or(true, |b| b.can_afford(estimated_tokens))
    }

    /// Claim `estimated_tokens` for a call about to be made.
    ///
    /// Concurrent callers cannot both pass against the same remaining
    /// balance. Always succeeds without a budget.
    pub fn try_reserve(&self, estimated_tokens: u64) -> bool {
        self.budget
            .as_ref()
            .map_or(true, |b| b.try_reserve(estimated_tokens))
    }

    /// Reserve tokens for one call; the guard gives them back on drop
    /// unless [`Reservation::settle`] records the real spend.
    pub fn reserve(&self, estimated_tokens: u64) -> Option<Reservation<'_>> {
        self.try_reserve(estimated_tokens).then_some(Reservation {
            tracker: self,
            tokens: estimated_tokens,
        })
    }

    /// Give back a reservation whose call spent nothing.
    pub fn release(&self, reserved: u64) {
        if let Some(budget) = &self.budget {
            budget.release(reserved);
        }
    }

    /// Record a call made under a reservation of `reserved` tokens.
    pub fn record_reserved(&self, reserved: u64, usage: &TokenUsage, model: &str) {
        if let Some(budget) = &self.budget {
            budget.settle(reserved, u64::from(usage.total()));
        }
        self.usage.write().add(usage, model);
    }

    /// Record a provider call.
    pub fn record(&self, usage: &TokenUsage, model: &str) {
        if let Some(budget) = &self.budget {
            budget.record(u64::from(usage.total()));
        }
        self.usage.write().add(usage, model);
    }

    pub fn record_cache_hit(&self) {
        self.usage.write().cache_hits += 1;
    }

    pub fn record_exact_match(&self) {
        self.usage.write().exact_matches += 1;
    }

    /// Tokens left, if a budget is set.
    pub fn remaining(&self) -> Option<u64> {
        self.budget.as_ref().map(TokenBudget::remaining)
    }

    /// Snapshot of accumulated usage.
    pub fn get_usage(&self) -> LlmUsage {
        self.usage.read().clone()
    }

    pub fn reset(&self) {
        if let Some(budget) = &self.budget {
            budget.reset();
        }
        *self.usage.write() = LlmUsage::default();
    }
}

/// Tokens held for an in-flight call.
pub struct Reservation<'a> {
    tracker: &'a BudgetTracker,
    tokens: u64,
}

impl Reservation<'_> {
    /// Swap the reservation for the call's reported usage.
    pub fn settle(mut self, usage: &TokenUsage, model: &str) {
        self.tracker.record_reserved(self.tokens, usage, model);
        self.tokens = 0;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.tokens > 0 {
            self.tracker.release(self.tokens);
        }
    }
}
