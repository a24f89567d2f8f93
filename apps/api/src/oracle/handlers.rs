use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::AppError;
use crate::length::{estimate_tokens, normalize};
use crate::oracle::OracleError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteBody {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewriteResponse {
    pub text: String,
    pub char_count: usize,
    pub estimated_tokens: usize,
    pub model: String,
    pub usage: serde_json::Value,
}

/// POST /api/v1/rewrite
///
/// Single oracle call with caller-supplied prompts, no length control.
pub async fn handle_rewrite(
    State(state): State<AppState>,
    Json(body): Json<RewriteBody>,
) -> Result<Json<RewriteResponse>, AppError> {
    if body.system_prompt.trim().is_empty() || body.user_prompt.trim().is_empty() {
        return Err(AppError::Validation(
            "systemPrompt and userPrompt must not be empty".to_string(),
        ));
    }

    let params = state
        .config
        .model_parameters(body.model, body.max_tokens, body.temperature);

    let reply = match state
        .oracle
        .rewrite(&body.system_prompt, &body.user_prompt, &params)
        .await
    {
        Ok(reply) => reply,
        Err(OracleError::Malformed(reason)) => {
            warn!(%reason, "Oracle reply had no text; returning empty rewrite");
            Default::default()
        }
        Err(e) => return Err(e.into()),
    };

    let text = normalize(&reply.text);
    let char_count = text.chars().count();
    let usage = if reply.usage.is_null() {
        serde_json::json!({})
    } else {
        reply.usage
    };

    Ok(Json(RewriteResponse {
        estimated_tokens: estimate_tokens(&text),
        char_count,
        text,
        model: params.model,
        usage,
    }))
}
