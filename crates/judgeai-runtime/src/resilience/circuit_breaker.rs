//! Circuit breaker to prevent cascade failures.
//!
//! When provider calls fail repeatedly, the circuit opens and
//! evaluations fail fast until the recovery timeout passes.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::duration_str;

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening circuit
    pub failure_threshold: u32,

    /// Time before attempting recovery
    #[serde(with = "duration_str")]
    pub recovery_timeout: Duration,

    /// Successes in half-open state needed to close circuit
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 1,
        }
    }
}

/// State of a circuit.
#[derive(Debug, Clone)]
pub enum CircuitState {
    /// Normal operation
    Closed { failures: u32 },

    /// Circuit is open, all calls fail fast
    Open { opened_at: Instant },

    /// Testing if circuit can close
    HalfOpen { successes: u32 },
}

/// Circuit breaker with one circuit per provider name.
pub struct CircuitBreaker {
    states: RwLock<HashMap<String, CircuitState>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether calls to `provider` should fail fast.
    pub fn is_open(&self, provider: &str) -> bool {
        let states = self.states.read();
        match states.get(provider) {
            Some(CircuitState::Open { opened_at }) => {
                if opened_at.elapsed() >= self.config.recovery_timeout {
                    drop(states);
                    self.transition_to_half_open(provider);
                    false
                } else {
                    true
                }
            }
            _ => false,
        }
    }

    /// Record a successful provider call.
    pub fn record_success(&self, provider: &str) {
        let mut states = self.states.write();
        match states.get(provider).cloned() {
            Some(CircuitState::HalfOpen { successes }) => {
                if successes + 1 >= self.config.success_threshold {
                    states.insert(provider.to_string(), CircuitState::Closed { failures: 0 });
                    tracing::info!(provider, "Circuit closed after successful recovery");
                } else {
                    states.insert(
                        provider.to_string(),
                        CircuitState::HalfOpen {
                            successes: successes + 1,
                        },
                    );
                }
            }
            Some(CircuitState::Closed { failures }) if failures > 0 => {
                states.insert(provider.to_string(), CircuitState::Closed { failures: 0 });
            }
            _ => {}
        }
    }

    /// Record a failed provider call.
    pub fn record_failure(&self, provider: &str) {
        let mut states = self.states.write();
        let failures = match states.get(provider).cloned() {
            Some(CircuitState::Closed { failures }) => failures + 1,
            None => 1,
            Some(CircuitState::HalfOpen { .. }) => {
                states.insert(
                    provider.to_string(),
                    CircuitState::Open {
                        opened_at: Instant::now(),
                    },
                );
                tracing::warn!(provider, "Circuit reopened after failed recovery attempt");
                return;
            }
            Some(CircuitState::Open { .. }) => return,
        };

        if failures >= self.config.failure_threshold {
            states.insert(
                provider.to_string(),
                CircuitState::Open {
                    opened_at: Instant::now(),
                },
            );
            tracing::warn!(provider, failures, "Circuit opened after repeated failures");
        } else {
            states.insert(provider.to_string(), CircuitState::Closed { failures });
        }
    }

    fn transition_to_half_open(&self, provider: &str) {
        let mut states = self.states.write();
        if matches!(states.get(provider), Some(CircuitState::Open { .. })) {
            states.insert(provider.to_string(), CircuitState::HalfOpen { successes: 0 });
            tracing::info!(provider, "Circuit transitioning to half-open for recovery test");
        }
    }

    /// Get current state of a circuit.
    pub fn state(&self, provider: &str) -> CircuitState {
        self.states
            .read()
            .get(provider)
            .cloned()
            .unwrap_or(CircuitState::Closed { failures: 0 })
    }

    /// Reset all circuits to closed.
    pub fn reset(&self) {
        self.states.write().clear();
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
