use std::{env, str::FromStr, time::Duration};
use tracing::warn;

use crate::{Error, Result};

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_GROQ_MODEL: &str = "gemma-7b-it";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_EMBEDDING_MODEL: &str = "llama2";
pub const DEFAULT_SOURCE_URL: &str = "https://python.langchain.com/v0.1/docs/modules/tools/";

/// Process configuration, read once from the environment.
///
/// Secrets are optional at load time. Each feature asks for the ones it needs
/// through the accessor methods, which fail with [`Error::ConfigurationMissing`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    openai_api_key: Option<String>,
    groq_api_key: Option<String>,
    pub sentry_dsn: Option<String>,
    pub chain_tracing: bool,
    pub openai_model: String,
    pub groq_model: String,
    pub ollama_url: String,
    pub embedding_model: String,
    pub source_url: String,
    pub request_timeout: Option<Duration>,
    pub retry_window: Duration,
    pub host: String,
    pub port: u16,
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let or = |name: &str, default: &str| var(name).unwrap_or_else(|| default.to_string());

        Self {
            openai_api_key: var("OPENAI_API_KEY"),
            groq_api_key: var("GROQ_API_KEY"),
            sentry_dsn: var("SENTRY_DSN"),
            chain_tracing: var("CHAIN_TRACING").is_some_and(|v| is_truthy(&v)),
            openai_model: or("OPENAI_MODEL", DEFAULT_OPENAI_MODEL),
            groq_model: or("GROQ_MODEL", DEFAULT_GROQ_MODEL),
            ollama_url: or("OLLAMA_URL", DEFAULT_OLLAMA_URL),
            embedding_model: or("OLLAMA_EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            source_url: or("RAG_SOURCE_URL", DEFAULT_SOURCE_URL),
            request_timeout: parse_var::<u64>("REQUEST_TIMEOUT_SECS", var("REQUEST_TIMEOUT_SECS"))
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            retry_window: Duration::from_secs(
                parse_var("RETRY_WINDOW_SECS", var("RETRY_WINDOW_SECS")).unwrap_or(0),
            ),
            host: or("HOST", "127.0.0.1"),
            port: parse_var("PORT", var("PORT")).unwrap_or(8000),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if `$OPENAI_API_KEY` is not set.
    pub fn openai_api_key(&self) -> Result<&str> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| Error::ConfigurationMissing("OPENAI_API_KEY".to_string()))
    }

    /// # Errors
    ///
    /// Returns [`Error::ConfigurationMissing`] if `$GROQ_API_KEY` is not set.
    pub fn groq_api_key(&self) -> Result<&str> {
        self.groq_api_key
            .as_deref()
            .ok_or_else(|| Error::ConfigurationMissing("GROQ_API_KEY".to_string()))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Checks that every listed variable is present in the process environment.
///
/// # Errors
///
/// Returns [`Error::ConfigurationMissing`] naming the first variable that is unset.
pub fn require(vars: &[&str]) -> Result<()> {
    require_with(vars, |name| env::var(name).ok())
}

fn require_with(vars: &[&str], lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
    for var in vars {
        if lookup(var).map_or(true, |v| v.trim().is_empty()) {
            return Err(Error::ConfigurationMissing((*var).to_string()));
        }
    }

    Ok(())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn parse_var<T: FromStr>(name: &str, value: Option<String>) -> Option<T> {
    let value = value?;

    value.trim().parse().map_or_else(
        |_| {
            warn!("Ignoring invalid value for ${name}: {value:?}");
            None
        },
        Some,
    )
}
