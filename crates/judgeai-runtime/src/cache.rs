//! Caching layer for judgeai-runtime.
//!
//! Identical prompts sent to the same model at the same temperature get
//! the cached verdict instead of a second provider call. Only the parsed
//! verdict is stored; caller metadata never enters the cache.

use judgeai_core::Verdict;
use moka::future::Cache;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use crate::config::CacheConfig;

/// Cache key for a judge call.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CacheKey {
    provider: String,
    model: String,
    temperature_bits: u32,
    prompt_hash: u64,
}

impl CacheKey {
    /// Create a key from everything that determines the provider's answer.
    pub fn new(provider: &str, model: &str, temperature: f32, system: &str, user: &str) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            temperature_bits: temperature.to_bits(),
            prompt_hash: hash_prompt(system, user),
        }
    }
}

/// A verdict plus the model that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedVerdict {
    pub verdict: Verdict,
    pub model: String,
}

/// Verdict cache using moka.
pub struct VerdictCache {
    cache: Cache<CacheKey, CachedVerdict>,
}

impl VerdictCache {
    /// Create a new cache with the given capacity and time-to-live.
    pub fn new(max_entries: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();

        Self { cache }
    }

    /// Build from config; `None` when caching is disabled.
    pub fn from_config(config: &CacheConfig) -> Option<Self> {
        config
            .enabled
            .then(|| Self::new(config.max_entries, config.ttl))
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CachedVerdict> {
        self.cache.get(key).await
    }

    pub async fn insert(&self, key: CacheKey, value: CachedVerdict) {
        self.cache.insert(key, value).await;
    }

    /// Clear the cache.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Approximate entry count (moka updates it lazily).
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for VerdictCache {
    fn default() -> Self {
        let config = CacheConfig::default();
        Self::new(config.max_entries, config.ttl)
    }
}

fn hash_prompt(system: &str, user: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    system.hash(&mut hasher);
    user.hash(&mut hasher);
    hasher.finish()
}
