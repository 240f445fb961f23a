//! Environment-driven configuration
//!
//! All tunables come from `.env` / process environment with the same
//! defaults the hosted deployment uses. Loaded once at startup and passed
//! down explicitly; nothing here is global.

use crate::error::{AdvisorError, Result};
use std::env;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://bionicadvisor.openai.azure.com/";
const DEFAULT_DEPLOYMENT: &str = "gpt-35-turbo";
const DEFAULT_API_VERSION: &str = "2024-12-01-preview";

#[derive(Debug, Clone)]
pub struct AdvisorConfig {
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,

    pub max_tokens: u32,
    pub temperature: f32,

    pub max_retries: u32,
    pub retry_base_delay: Duration,

    /// Fan-out bound: tickers past this count are dropped from the batch.
    pub max_tickers: usize,
    /// Concurrent analysis calls; kept small to avoid self-inflicted
    /// rate limiting.
    pub analysis_workers: usize,
}

impl Default for AdvisorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            deployment: DEFAULT_DEPLOYMENT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            max_retries: 5,
            retry_base_delay: Duration::from_secs(2),
            max_tickers: 30,
            analysis_workers: 4,
        }
    }
}

impl AdvisorConfig {
    /// Build from the environment. Fails only when the API key is missing;
    /// everything else falls back to defaults.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("AZURE_OPENAI_API_KEY").map_err(|_| {
            AdvisorError::ConfigError(
                "AZURE_OPENAI_API_KEY not set; see .env.example".to_string(),
            )
        })?;

        let defaults = Self::default();

        Ok(Self {
            api_key,
            endpoint: env_or("AZURE_OPENAI_ENDPOINT", &defaults.endpoint),
            deployment: env_or("AZURE_OPENAI_DEPLOYMENT", &defaults.deployment),
            api_version: env_or("AZURE_OPENAI_API_VERSION", &defaults.api_version),
            max_tokens: env_parsed("ADVISOR_MAX_TOKENS", defaults.max_tokens)?,
            temperature: env_parsed("ADVISOR_TEMPERATURE", defaults.temperature)?,
            max_retries: env_parsed("ADVISOR_MAX_RETRIES", defaults.max_retries)?,
            retry_base_delay: Duration::from_secs(env_parsed(
                "ADVISOR_RETRY_BASE_SECS",
                defaults.retry_base_delay.as_secs(),
            )?),
            max_tickers: env_parsed("ADVISOR_MAX_TICKERS", defaults.max_tickers)?,
            analysis_workers: env_parsed("ADVISOR_ANALYSIS_WORKERS", defaults.analysis_workers)?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(value) => value.parse().map_err(|_| {
            AdvisorError::ConfigError(format!("{} has an unparsable value: {}", key, value))
        }),
        Err(_) => Ok(default),
    }
}
