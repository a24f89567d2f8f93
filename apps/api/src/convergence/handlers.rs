//! Axum route handlers for the Adjust API.

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::config::Config;
use crate::convergence::controller::run_convergence_loop;
use crate::convergence::report::AdjustmentSummary;
use crate::convergence::request::{AdjustmentRequest, ToleranceBand};
use crate::errors::AppError;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request types
// ────────────────────────────────────────────────────────────────────────────

/// Optional per-run settings. Anything omitted falls back to the configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunOverrides {
    pub tolerance_lower: Option<f64>,
    pub tolerance_upper: Option<f64>,
    pub max_rounds: Option<u32>,
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

impl RunOverrides {
    pub fn to_request(
        &self,
        config: &Config,
        source_text: String,
        target_length: usize,
    ) -> AdjustmentRequest {
        let mut request = AdjustmentRequest::new(source_text, target_length);
        request.tolerance = ToleranceBand::new(
            self.tolerance_lower
                .unwrap_or(config.default_tolerance_lower),
            self.tolerance_upper.unwrap_or(0.0),
        );
        request.max_rounds = self.max_rounds.unwrap_or(config.default_max_rounds);
        request.model =
            config.model_parameters(self.model.clone(), self.max_tokens, self.temperature);
        request
    }
}

#[derive(Debug, Deserialize)]
pub struct AdjustBody {
    pub source_text: String,
    pub target_length: usize,
    #[serde(default)]
    pub must_keep: Vec<String>,
    #[serde(flatten)]
    pub overrides: RunOverrides,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/adjust
///
/// Runs the convergence loop on `source_text` and returns the final text with
/// its length, the rounds used and how the run ended.
pub async fn handle_adjust(
    State(state): State<AppState>,
    Json(body): Json<AdjustBody>,
) -> Result<Json<AdjustmentSummary>, AppError> {
    let mut request = body
        .overrides
        .to_request(&state.config, body.source_text, body.target_length);
    request.must_keep = body.must_keep;

    let report = run_convergence_loop(&request, state.oracle.as_ref()).await?;
    let summary = AdjustmentSummary::from_report(report, &request)?;

    Ok(Json(summary))
}
