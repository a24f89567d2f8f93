//! Caller-facing summary of a convergence run.

use serde::{Deserialize, Serialize};

use crate::convergence::request::{AdjustmentRequest, Candidate, ConvergenceReport, ToleranceBand};
use crate::errors::AppError;

/// How the run ended, from the caller's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// Final length equals the target.
    Exact,
    /// Final length is inside the tolerance band.
    WithinTolerance,
    /// Round budget ran out; the length constraint still holds.
    ExhaustedRounds,
}

impl OutcomeKind {
    /// Kind of a finished run, from its final candidate.
    pub fn classify(candidate: &Candidate, exhausted: bool, target: usize) -> OutcomeKind {
        if exhausted {
            OutcomeKind::ExhaustedRounds
        } else if candidate.normalized_length == target {
            OutcomeKind::Exact
        } else {
            OutcomeKind::WithinTolerance
        }
    }
}

/// Length badge for the final text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthStatus {
    Exact,
    Acceptable,
    /// Short by no more than twice the accepted undershoot.
    SlightlyShort,
    TooShort,
    Exceeded,
}

pub fn length_status(length: usize, target: usize, tolerance: &ToleranceBand) -> LengthStatus {
    if length == target {
        return LengthStatus::Exact;
    }
    if length > target {
        return LengthStatus::Exceeded;
    }
    let percent_delta = (length as f64 - target as f64) / target as f64;
    if tolerance.accepts(length, target) {
        LengthStatus::Acceptable
    } else if percent_delta >= -2.0 * tolerance.lower_fraction {
        LengthStatus::SlightlyShort
    } else {
        LengthStatus::TooShort
    }
}

/// Terms from `terms` that do not appear in `text` (case-insensitive).
pub fn missing_terms(text: &str, terms: &[String]) -> Vec<String> {
    let haystack = text.to_lowercase();
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && !haystack.contains(&t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSummary {
    pub round: u32,
    pub length: usize,
}

/// Response body of `POST /api/v1/adjust`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentSummary {
    pub final_text: String,
    pub final_length: usize,
    pub rounds_used: u32,
    pub outcome_kind: OutcomeKind,
    pub target_length: usize,
    pub lower_bound: usize,
    pub upper_bound: usize,
    pub status: LengthStatus,
    pub history: Vec<RoundSummary>,
    pub missing_terms: Vec<String>,
}

impl AdjustmentSummary {
    /// Builds the summary, or surfaces the oracle failure as an `AppError`.
    pub fn from_report(
        report: ConvergenceReport,
        request: &AdjustmentRequest,
    ) -> Result<Self, AppError> {
        let history = report
            .history
            .iter()
            .map(|c| RoundSummary {
                round: c.round,
                length: c.normalized_length,
            })
            .collect();

        let target = request.target_length;
        let rounds_used = report.rounds_used;
        let exhausted = report.is_exhausted();
        let candidate = report.into_final()?;
        let outcome_kind = OutcomeKind::classify(&candidate, exhausted, target);

        Ok(Self {
            missing_terms: missing_terms(&candidate.text, &request.must_keep),
            status: length_status(candidate.normalized_length, target, &request.tolerance),
            final_length: candidate.normalized_length,
            final_text: candidate.text,
            rounds_used,
            outcome_kind,
            target_length: target,
            lower_bound: request.lower_bound(),
            upper_bound: request.upper_bound(),
            history,
        })
    }
}
