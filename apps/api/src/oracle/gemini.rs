//! Gemini backend for the rewrite oracle.
//!
//! One HTTP call per `rewrite`. No retries, no backoff: a 429 is reported as
//! `RateLimited` with the server's `retry-after` hint and the caller decides.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header::RETRY_AFTER, Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::length::estimate_tokens;
use crate::oracle::{ModelParameters, OracleError, OracleReply, RewriteOracle, MAX_PROMPT_TOKENS};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
    safety_settings: Vec<SafetySetting<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    candidate_count: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting<'a> {
    category: &'a str,
    threshold: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    usage_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Text of the first part of the first candidate.
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.first())
            .and_then(|p| p.text.as_deref())
    }
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    error: GoogleErrorBody,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    message: String,
}

/// HTTP client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:generateContent", self.base_url)
    }
}

#[async_trait]
impl RewriteOracle for GeminiClient {
    async fn rewrite(
        &self,
        system: &str,
        user: &str,
        params: &ModelParameters,
    ) -> Result<OracleReply, OracleError> {
        let estimated_tokens = estimate_tokens(&format!("{system}\n{user}"));
        if estimated_tokens > MAX_PROMPT_TOKENS {
            return Err(OracleError::PromptTooLarge {
                estimated_tokens,
                limit: MAX_PROMPT_TOKENS,
            });
        }

        // Gemini has no separate system slot on this endpoint; both go in one part.
        let combined = format!("{system}\n\n{user}");
        let request_body = GenerateContentRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: &combined }],
            }],
            generation_config: GenerationConfig {
                temperature: params.temperature,
                max_output_tokens: params.max_tokens,
                candidate_count: 1,
            },
            safety_settings: SAFETY_CATEGORIES
                .iter()
                .map(|&category| SafetySetting {
                    category,
                    threshold: "BLOCK_NONE",
                })
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint(&params.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()));
            warn!(?retry_after_secs, model = %params.model, "Oracle rate limited");
            return Err(OracleError::RateLimited { retry_after_secs });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Oracle returned {}: {}", status, body);
            let message = serde_json::from_str::<GoogleError>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(OracleError::Unavailable {
                status: Some(status.as_u16()),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|e| OracleError::Malformed(format!("response is not valid JSON: {e}")))?;

        let text = parsed.text().ok_or_else(|| {
            OracleError::Malformed("missing candidates[0].content.parts[0].text".to_string())
        })?;

        debug!(
            model = %params.model,
            estimated_tokens,
            returned_chars = text.chars().count(),
            "Oracle call succeeded"
        );

        Ok(OracleReply {
            text: text.to_string(),
            usage: parsed
                .usage_metadata
                .unwrap_or_else(|| serde_json::json!({})),
        })
    }
}

/// `Retry-After` is either delta-seconds or an HTTP-date. A date in the past
/// means "retry now". Anything unparseable yields no hint.
fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?;
    let wait = at.with_timezone(&Utc) - now;
    Some(wait.num_seconds().max(0) as u64)
}
