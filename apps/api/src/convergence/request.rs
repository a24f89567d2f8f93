//! Input and output types of a convergence run.

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::length::{char_count, hard_cap_to_max, normalize};
use crate::oracle::{ModelParameters, OracleError};

pub const MIN_TARGET_LENGTH: usize = 10;
pub const MAX_TARGET_LENGTH: usize = 10_000;
pub const MAX_ROUNDS_LIMIT: u32 = 12;
pub const DEFAULT_MAX_ROUNDS: u32 = 6;
pub const DEFAULT_LOWER_FRACTION: f64 = 0.05;

/// Absorbs float noise such as `300.0 * 0.95 == 284.99999999999997`.
const BOUND_EPSILON: f64 = 1e-9;

// ────────────────────────────────────────────────────────────────────────────
// Tolerance band
// ────────────────────────────────────────────────────────────────────────────

/// Accepted window below the target, as fractions of the target length.
///
/// - `lower_fraction`: maximum accepted undershoot (0.05 → a 300-char target accepts 285–300).
/// - `upper_fraction`: slack below the target that expansion rounds aim for
///   (0.0 → expand all the way to the target itself).
///
/// Overshoot is never accepted; the band only extends downwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBand {
    pub lower_fraction: f64,
    pub upper_fraction: f64,
}

impl Default for ToleranceBand {
    fn default() -> Self {
        Self {
            lower_fraction: DEFAULT_LOWER_FRACTION,
            upper_fraction: 0.0,
        }
    }
}

impl ToleranceBand {
    pub fn new(lower_fraction: f64, upper_fraction: f64) -> Self {
        Self {
            lower_fraction,
            upper_fraction,
        }
    }

    /// Smallest accepted length: the first whole length inside the band.
    pub fn lower_bound(&self, target: usize) -> usize {
        let exact = target as f64 * (1.0 - self.lower_fraction);
        ((exact - BOUND_EPSILON).ceil().max(0.0) as usize).min(target)
    }

    /// Length expansion rounds aim for. Never above `target`, never below `lower_bound`.
    pub fn upper_bound(&self, target: usize) -> usize {
        let slack = (target as f64 * self.upper_fraction).round() as usize;
        target
            .saturating_sub(slack)
            .max(self.lower_bound(target))
            .min(target)
    }

    /// True if `length` sits inside the band: no overshoot, undershoot within `lower_fraction`.
    pub fn accepts(&self, length: usize, target: usize) -> bool {
        (self.lower_bound(target)..=target).contains(&length)
    }

    fn validate(&self) -> Result<(), AppError> {
        if !(self.lower_fraction > 0.0 && self.lower_fraction < 1.0) {
            return Err(AppError::Validation(format!(
                "tolerance lower fraction must be in (0, 1), got {}",
                self.lower_fraction
            )));
        }
        if !(self.upper_fraction >= 0.0 && self.upper_fraction <= self.lower_fraction) {
            return Err(AppError::Validation(format!(
                "tolerance upper fraction must be in [0, {}], got {}",
                self.lower_fraction, self.upper_fraction
            )));
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Request
// ────────────────────────────────────────────────────────────────────────────

/// Everything one convergence run needs. Not mutated once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentRequest {
    pub source_text: String,
    pub target_length: usize,
    pub tolerance: ToleranceBand,
    pub max_rounds: u32,
    pub model: ModelParameters,
    /// Terms the rewrite must keep verbatim. Listed in the prompts and checked afterwards.
    #[serde(default)]
    pub must_keep: Vec<String>,
}

impl AdjustmentRequest {
    pub fn new(source_text: impl Into<String>, target_length: usize) -> Self {
        Self {
            source_text: source_text.into(),
            target_length,
            tolerance: ToleranceBand::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            model: ModelParameters::default(),
            must_keep: Vec::new(),
        }
    }

    /// Fails fast on anything that would make the run meaningless. Called before any oracle call.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.source_text.trim().is_empty() {
            return Err(AppError::Validation(
                "source_text cannot be empty".to_string(),
            ));
        }
        if !(MIN_TARGET_LENGTH..=MAX_TARGET_LENGTH).contains(&self.target_length) {
            return Err(AppError::Validation(format!(
                "target_length must be between {MIN_TARGET_LENGTH} and {MAX_TARGET_LENGTH}, got {}",
                self.target_length
            )));
        }
        if !(1..=MAX_ROUNDS_LIMIT).contains(&self.max_rounds) {
            return Err(AppError::Validation(format!(
                "max_rounds must be between 1 and {MAX_ROUNDS_LIMIT}, got {}",
                self.max_rounds
            )));
        }
        self.tolerance.validate()
    }

    pub fn lower_bound(&self) -> usize {
        self.tolerance.lower_bound(self.target_length)
    }

    pub fn upper_bound(&self) -> usize {
        self.tolerance.upper_bound(self.target_length)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Candidates and outcome
// ────────────────────────────────────────────────────────────────────────────

/// One oracle answer, normalized and measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub normalized_length: usize,
    /// 1-based round that produced this text. 0 means it did not come from the oracle.
    pub round: u32,
}

impl Candidate {
    pub fn new(text: &str, round: u32) -> Self {
        let text = normalize(text);
        let normalized_length = text.chars().count();
        Self {
            text,
            normalized_length,
            round,
        }
    }

    /// Applies the hard cap. The result never exceeds `max` characters.
    pub fn capped(&self, max: usize) -> Candidate {
        let text = hard_cap_to_max(&self.text, max);
        Candidate {
            normalized_length: char_count(&text),
            text,
            round: self.round,
        }
    }
}

#[derive(Debug)]
pub enum ConvergenceOutcome {
    /// A candidate landed inside the tolerance band.
    Converged(Candidate),
    /// The round budget ran out; carries the best candidate seen, hard-capped.
    ExhaustedRounds(Candidate),
    /// The oracle could not be used. No candidate is returned.
    OracleFailed(OracleError),
}

/// Full record of a run: the outcome plus every candidate in round order.
#[derive(Debug)]
pub struct ConvergenceReport {
    pub outcome: ConvergenceOutcome,
    pub history: Vec<Candidate>,
    /// Number of oracle calls issued, including a failed one.
    pub rounds_used: u32,
}

impl ConvergenceReport {
    #[cfg(test)]
    pub fn final_candidate(&self) -> Option<&Candidate> {
        match &self.outcome {
            ConvergenceOutcome::Converged(c) | ConvergenceOutcome::ExhaustedRounds(c) => Some(c),
            ConvergenceOutcome::OracleFailed(_) => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.outcome, ConvergenceOutcome::ExhaustedRounds(_))
    }

    /// Consumes the report, yielding the final candidate or the oracle failure.
    pub fn into_final(self) -> Result<Candidate, OracleError> {
        match self.outcome {
            ConvergenceOutcome::Converged(c) | ConvergenceOutcome::ExhaustedRounds(c) => Ok(c),
            ConvergenceOutcome::OracleFailed(e) => Err(e),
        }
    }
}
