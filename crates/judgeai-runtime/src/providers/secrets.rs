//! Secure credential handling for LLM providers.
//!
//! - **No accidental logging**: credentials never appear in Debug/Display output
//! - **Memory safety**: credentials are zeroed on drop via `secrecy`
//! - **One lookup order**: config value first, then environment variables in order
//!
//! ## Usage
//!
//! ```ignore
//! use crate::providers::secrets::ApiCredential;
//!
//! let cred = ApiCredential::from_config_or_env(
//!     &config,
//!     "api_key",
//!     &["JUDGEAI_API_KEY", "OPENAI_API_KEY"],
//!     "OpenAI API key",
//! )?;
//!
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Provider-neutral API key variable. Checked before any vendor variable.
pub const JUDGEAI_API_KEY_ENV: &str = "JUDGEAI_API_KEY";

/// Variables that mean "an API key is configured" for the default provider.
const DEFAULT_KEY_VARS: [&str; 2] = [JUDGEAI_API_KEY_ENV, "OPENAI_API_KEY"];

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from configuration file/JSON
    Config,
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// Read an environment variable, treating an empty value as unset.
fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// True when `JUDGEAI_API_KEY` or `OPENAI_API_KEY` holds a non-empty value.
pub fn any_key_configured() -> bool {
    any_key_configured_with(|var| std::env::var(var).ok())
}

/// [`any_key_configured`] against any variable lookup.
pub fn any_key_configured_with<F>(lookup: F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    DEFAULT_KEY_VARS
        .iter()
        .any(|var| lookup(var).is_some_and(|v| !v.trim().is_empty()))
}

/// Non-blank string at `config[key]`.
fn config_value<'a>(config: &'a JsonValue, key: &str) -> Option<&'a str> {
    config[key].as_str().filter(|v| !v.trim().is_empty())
}

/// A securely-stored API credential.
///
/// Debug shows `[REDACTED]`; the value is only reachable through
/// [`ApiCredential::expose`].
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Create a new credential from a string value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load credential from JSON config, falling back to environment variables.
    ///
    /// 1. `config[config_key]` if it is a non-blank string
    /// 2. the first non-empty variable in `env_vars`
    /// 3. error naming every place that was checked
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_vars: &[&str],
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config_value(config, config_key) {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        for var in env_vars {
            if let Some(value) = non_empty_env(var) {
                tracing::debug!(credential = name, env_var = %var, "Loaded credential from environment");
                return Ok(Self::new(value, CredentialSource::Environment, name));
            }
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in config or one of {} environment variables",
            name,
            config_key,
            env_vars.join(", ")
        )))
    }

    /// Check if a credential is available (without loading it).
    pub fn is_available(config: &JsonValue, config_key: &str, env_vars: &[&str]) -> bool {
        config_value(config, config_key).is_some()
            || env_vars.iter().any(|var| non_empty_env(var).is_some())
    }

    /// Expose the credential value for use in API calls.
    ///
    /// Only call this where the credential is sent (an HTTP header).
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    /// Check if the credential is empty.
    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    /// Get the source of this credential.
    pub fn source(&self) -> CredentialSource {
        self.source
    }

    /// Get the human-readable name of this credential.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
