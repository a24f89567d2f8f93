use anyhow::{Context, Result};

use crate::convergence::request::{DEFAULT_LOWER_FRACTION, DEFAULT_MAX_ROUNDS};
use crate::oracle::gemini::DEFAULT_BASE_URL;
use crate::oracle::{ModelParameters, DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub gemini_api_key: String,
    pub oracle_base_url: String,
    pub oracle_model: String,
    pub oracle_timeout_secs: u64,
    pub oracle_max_tokens: u32,
    pub oracle_temperature: f32,
    /// Accepted undershoot when a request does not specify one.
    pub default_tolerance_lower: f64,
    pub default_max_rounds: u32,
    pub port: u16,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            oracle_base_url: DEFAULT_BASE_URL.to_string(),
            oracle_model: DEFAULT_MODEL.to_string(),
            oracle_timeout_secs: 60,
            oracle_max_tokens: DEFAULT_MAX_TOKENS,
            oracle_temperature: DEFAULT_TEMPERATURE,
            default_tolerance_lower: DEFAULT_LOWER_FRACTION,
            default_max_rounds: DEFAULT_MAX_ROUNDS,
            port: 8080,
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = Config::default();
        Ok(Config {
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            oracle_base_url: optional_env("ORACLE_BASE_URL", defaults.oracle_base_url),
            oracle_model: optional_env("ORACLE_MODEL", defaults.oracle_model),
            oracle_timeout_secs: parse_env("ORACLE_TIMEOUT_SECS", defaults.oracle_timeout_secs)?,
            oracle_max_tokens: parse_env("ORACLE_MAX_TOKENS", defaults.oracle_max_tokens)?,
            oracle_temperature: parse_env("ORACLE_TEMPERATURE", defaults.oracle_temperature)?,
            default_tolerance_lower: parse_env(
                "DEFAULT_TOLERANCE_LOWER",
                defaults.default_tolerance_lower,
            )?,
            default_max_rounds: parse_env("DEFAULT_MAX_ROUNDS", defaults.default_max_rounds)?,
            port: parse_env("PORT", defaults.port)?,
            rust_log: optional_env("RUST_LOG", defaults.rust_log),
        })
    }

    /// Model parameters for one run: request values win over configured ones.
    pub fn model_parameters(
        &self,
        model: Option<String>,
        max_tokens: Option<u32>,
        temperature: Option<f32>,
    ) -> ModelParameters {
        ModelParameters {
            model: model.unwrap_or_else(|| self.oracle_model.clone()),
            max_tokens: max_tokens.unwrap_or(self.oracle_max_tokens),
            temperature: temperature.unwrap_or(self.oracle_temperature),
        }
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}
