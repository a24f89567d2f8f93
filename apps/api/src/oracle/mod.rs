//! Rewrite Oracle: the single seam between the service and any text-generation API.
//!
//! The controller and the session layer only ever see `dyn RewriteOracle`.
//! `GeminiClient` is the production backend; tests substitute `mock::ScriptedOracle`.
//!
//! Everything an oracle returns is untrusted. The text may be empty, unrelated to
//! the instructions, or any length at all.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod gemini;
pub mod handlers;
#[cfg(test)]
pub mod mock;

pub use gemini::GeminiClient;

/// Prompts whose estimated token count exceeds this are refused before any network call.
pub const MAX_PROMPT_TOKENS: usize = 8000;

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";
pub const DEFAULT_MAX_TOKENS: u32 = 1800;
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle unavailable{}: {message}", status_suffix(.status))]
    Unavailable { status: Option<u16>, message: String },

    #[error("Oracle rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Oracle returned a malformed response: {0}")]
    Malformed(String),

    #[error("Prompt too large: ~{estimated_tokens} tokens (limit {limit})")]
    PromptTooLarge { estimated_tokens: usize, limit: usize },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {s})")).unwrap_or_default()
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        OracleError::Unavailable {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// Opaque generation settings passed through to the backend unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelParameters {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// One successful oracle response.
#[derive(Debug, Clone, Default)]
pub struct OracleReply {
    pub text: String,
    /// Provider usage metadata, passed through as-is.
    pub usage: serde_json::Value,
}

/// Capability interface for text rewriting backends.
///
/// Carried in `AppState` as `Arc<dyn RewriteOracle>`. Implementations must not
/// retry internally: rate limits and transport failures are surfaced to the caller.
#[async_trait]
pub trait RewriteOracle: Send + Sync {
    async fn rewrite(
        &self,
        system: &str,
        user: &str,
        params: &ModelParameters,
    ) -> Result<OracleReply, OracleError>;
}
