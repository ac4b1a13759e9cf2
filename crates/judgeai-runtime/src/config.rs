//! Judge configuration.
//!
//! Precedence, lowest to highest: built-in defaults, config file,
//! `JUDGEAI_*` environment variables, explicit setters (CLI flags,
//! `SemanticJudge::new` arguments).
//!
//! ```yaml
//! provider: openai
//! model: gpt-4o-mini
//! temperature: 0.0
//! timeout: 30s
//! max_retries: 2
//! concurrency: 4
//! cache:
//!   enabled: true
//!   max_entries: 1000
//!   ttl: 1h
//! circuit_breaker:
//!   failure_threshold: 3
//!   recovery_timeout: 30s
//!   success_threshold: 1
//! token_budget: 200000
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::providers::CompletionConfig;
use crate::resilience::CircuitBreakerConfig;

/// Errors from loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for human-readable durations ("30s", "1h 30m").
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// API key read from a config file. Never serialized, redacted in Debug.
#[derive(Clone, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Verdict cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_entries: u64,
    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Configuration for a [`SemanticJudge`](crate::SemanticJudge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Registered provider type ("openai", "anthropic")
    pub provider: String,

    /// Model name; `None` uses the provider's default
    pub model: Option<String>,

    /// Sampling temperature (0.0 for deterministic)
    pub temperature: f32,

    /// Maximum tokens in the judge's reply
    pub max_tokens: u32,

    /// Per-request timeout
    #[serde(with = "duration_str")]
    pub timeout: Duration,

    /// Custom API endpoint
    pub base_url: Option<String>,

    /// API key; takes precedence over `JUDGEAI_API_KEY` and vendor variables
    #[serde(skip_serializing)]
    pub api_key: Option<ConfigSecret>,

    /// Retries after the first attempt for retryable provider errors
    pub max_retries: usize,

    /// Pairs evaluated at once by `batch_evaluate`
    pub concurrency: usize,

    /// Skip the model for texts that are equal after whitespace normalization
    pub short_circuit_exact: bool,

    /// Ask for a JSON object response where the provider supports it
    pub json_mode: bool,

    /// Mark the system prompt cacheable (Anthropic)
    pub prompt_caching: bool,

    /// Custom user prompt with `{actual}` and `{expected}` placeholders
    pub prompt_template: Option<String>,

    pub cache: CacheConfig,

    pub circuit_breaker: CircuitBreakerConfig,

    /// Total tokens this judge may spend; `None` is unlimited
    pub token_budget: Option<u64>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: None,
            temperature: 0.0,
            max_tokens: 300,
            timeout: Duration::from_secs(30),
            base_url: None,
            api_key: None,
            max_retries: 2,
            concurrency: 1,
            short_circuit_exact: true,
            json_mode: true,
            prompt_caching: false,
            prompt_template: None,
            cache: CacheConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            token_budget: None,
        }
    }
}

impl JudgeConfig {
    /// Defaults with a model and temperature, as `SemanticJudge::new` takes them.
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: Some(model.into()),
            temperature,
            ..Default::default()
        }
    }

    /// Defaults overridden by `JUDGEAI_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a YAML or JSON file, then apply environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        config.apply_env()?;
        tracing::debug!(path = %path.display(), "Loaded judge config");
        Ok(config)
    }

    /// Apply `JUDGEAI_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("JUDGEAI_PROVIDER") {
            self.provider = v;
        }
        if let Some(v) = get("JUDGEAI_MODEL") {
            self.model = Some(v);
        }
        if let Some(v) = get("JUDGEAI_TEMPERATURE") {
            self.temperature = parse_value("JUDGEAI_TEMPERATURE", &v)?;
        }
        if let Some(v) = get("JUDGEAI_MAX_TOKENS") {
            self.max_tokens = parse_value("JUDGEAI_MAX_TOKENS", &v)?;
        }
        if let Some(v) = get("JUDGEAI_TIMEOUT") {
            self.timeout =
                humantime::parse_duration(&v).map_err(|e| ConfigError::InvalidValue {
                    key: "JUDGEAI_TIMEOUT".to_string(),
                    value: v.clone(),
                    reason: e.to_string(),
                })?;
        }
        if let Some(v) = get("JUDGEAI_BASE_URL") {
            self.base_url = Some(v);
        }
        if let Some(v) = get("JUDGEAI_MAX_RETRIES") {
            self.max_retries = parse_value("JUDGEAI_MAX_RETRIES", &v)?;
        }
        if let Some(v) = get("JUDGEAI_CONCURRENCY") {
            self.concurrency = parse_value("JUDGEAI_CONCURRENCY", &v)?;
        }

        Ok(())
    }

    /// Reject settings no provider call could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0.0, 2.0], got {}",
                self.temperature
            )));
        }
        // Anthropic's messages API caps temperature at 1.0.
        if self.provider == "anthropic" && self.temperature > 1.0 {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0.0, 1.0] for anthropic, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Invalid("max_tokens must be > 0".to_string()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be > 0".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be > 0".to_string()));
        }
        if let Some(url) = &self.base_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Provider section passed to the provider factory.
    pub fn provider_json(&self) -> serde_json::Value {
        let mut section = serde_json::Map::new();
        if let Some(url) = &self.base_url {
            section.insert("base_url".to_string(), url.clone().into());
        }
        if let Some(key) = &self.api_key {
            section.insert("api_key".to_string(), key.expose().into());
        }
        serde_json::Value::Object(section)
    }

    /// Per-request settings for the given model.
    pub fn completion_config(&self, model: &str) -> CompletionConfig {
        CompletionConfig {
            model: model.to_string(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
            json_mode: self.json_mode,
            prompt_caching: self.prompt_caching,
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = JudgeConfig::default();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.temperature, 0.0);
        assert_eq!(config.concurrency, 1);
        assert!(config.short_circuit_exact);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = JudgeConfig::default();
        config
            .apply_overrides(lookup(&[
                ("JUDGEAI_MODEL", "gpt-4o"),
                ("JUDGEAI_TEMPERATURE", "0.3"),
                ("JUDGEAI_TIMEOUT", "5s"),
                ("JUDGEAI_CONCURRENCY", "8"),
                ("JUDGEAI_PROVIDER", ""),
            ]))
            .unwrap();

        assert_eq!(config.model.as_deref(), Some("gpt-4o"));
        assert!((config.temperature - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.concurrency, 8);
        assert_eq!(config.provider, "openai");
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = JudgeConfig::default();
        let err = config
            .apply_overrides(lookup(&[("JUDGEAI_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("JUDGEAI_MAX_RETRIES"));
    }

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
provider: anthropic
model: claude-haiku-4-5
timeout: 45s
cache:
  ttl: 10m
circuit_breaker:
  failure_threshold: 5
  recovery_timeout: 1m
"#;
        let config: JudgeConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.provider, "anthropic");
        assert_eq!(config.timeout, Duration::from_secs(45));
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert!(config.cache.enabled);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            JudgeConfig {
                temperature: 3.0,
                ..Default::default()
            },
            JudgeConfig {
                concurrency: 0,
                ..Default::default()
            },
            JudgeConfig {
                max_tokens: 0,
                ..Default::default()
            },
            JudgeConfig {
                base_url: Some("ftp://nope".to_string()),
                ..Default::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err(), "{:?} should be invalid", config);
        }
    }

    #[test]
    fn test_provider_json_includes_base_url() {
        let config = JudgeConfig {
            base_url: Some("http://localhost:9000/v1".to_string()),
            ..Default::default()
        };
        assert_eq!(config.provider_json()["base_url"], "http://localhost:9000/v1");
        assert!(JudgeConfig::default().provider_json().get("base_url").is_none());
    }

    #[test]
    fn test_api_key_from_file_reaches_provider_section() {
        let yaml = "provider: openai\napi_key: sk-from-file\n";
        let config: JudgeConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.provider_json()["api_key"], "sk-from-file");
        assert!(!format!("{:?}", config).contains("sk-from-file"));
        assert!(!serde_yaml::to_string(&config).unwrap().contains("sk-from-file"));
        assert!(JudgeConfig::default().provider_json().get("api_key").is_none());
    }

    #[test]
    fn test_anthropic_temperature_capped_at_one() {
        let config = JudgeConfig {
            provider: "anthropic".to_string(),
            temperature: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = JudgeConfig {
            provider: "anthropic".to_string(),
            temperature: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let config = JudgeConfig {
            temperature: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duration_round_trip_is_readable() {
        let yaml = serde_yaml::to_string(&JudgeConfig::default()).unwrap();
        assert!(yaml.contains("timeout: 30s"));
    }
}
