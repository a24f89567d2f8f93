//! Convergence Controller: drives the rewrite oracle toward a target length.
//!
//! # Rounds
//! - Round 1 drafts from the normalized source. Direction (condense vs expand)
//!   is chosen from the source length.
//! - Every answer is normalized, measured and classified by `evaluate`.
//! - Overshoot → condense instructions. Undershoot beyond the band → expand
//!   instructions sized to reach the top of the band. Inside the band → done.
//! - At most `max_rounds` oracle calls per run. When the budget runs out the
//!   best candidate seen is kept.
//!
//! Every non-failed outcome passes through `hard_cap_to_max`, so the final text
//! never exceeds the target whatever the oracle did.
//!
//! Transport failures and rate limits abort the run immediately. A malformed
//! response counts as an empty candidate and the run continues.

use tracing::{debug, info, warn};

use crate::convergence::prompts::{
    CONDENSE_STRATEGY, CONDENSE_SYSTEM_TEMPLATE, CONDENSE_USER_TEMPLATE, COUNTING_RULES,
    DRAFT_SYSTEM_TEMPLATE, DRAFT_USER_TEMPLATE, EXPAND_STRATEGY, EXPAND_SYSTEM_TEMPLATE,
    EXPAND_USER_TEMPLATE, MUST_KEEP_FRAGMENT,
};
use crate::convergence::request::{
    AdjustmentRequest, Candidate, ConvergenceOutcome, ConvergenceReport,
};
use crate::errors::AppError;
use crate::length::normalize;
use crate::oracle::{OracleError, RewriteOracle};

// ────────────────────────────────────────────────────────────────────────────
// Evaluation
// ────────────────────────────────────────────────────────────────────────────

/// Classification of a candidate length against the request's target and band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    WithinTolerance,
    /// Longer than the target by `excess` characters.
    Overshoot { excess: usize },
    /// Below the band; `deficit` characters are missing to reach its top.
    Undershoot { deficit: usize },
}

pub fn evaluate(length: usize, request: &AdjustmentRequest) -> Verdict {
    let target = request.target_length;
    if length > target {
        Verdict::Overshoot {
            excess: length - target,
        }
    } else if request.tolerance.accepts(length, target) {
        Verdict::WithinTolerance
    } else {
        Verdict::Undershoot {
            deficit: request.upper_bound().saturating_sub(length).max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Correction {
    Condense { excess: usize },
    Expand { deficit: usize },
}

/// System and user instruction pair for one oracle call.
#[derive(Debug, Clone)]
pub struct Instructions {
    pub system: String,
    pub user: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Public entry point
// ────────────────────────────────────────────────────────────────────────────

/// Runs one adjustment to completion.
///
/// Returns `AppError::Validation` before any oracle call if the request is invalid.
/// Oracle failures are not errors here: they come back as `ConvergenceOutcome::OracleFailed`
/// together with the history gathered so far.
pub async fn run_convergence_loop(
    request: &AdjustmentRequest,
    oracle: &dyn RewriteOracle,
) -> Result<ConvergenceReport, AppError> {
    request.validate()?;

    let target = request.target_length;
    let source = normalize(&request.source_text);
    let source_length = source.chars().count();

    info!(
        target,
        source_length,
        lower_bound = request.lower_bound(),
        max_rounds = request.max_rounds,
        "Starting convergence run"
    );

    let mut history: Vec<Candidate> = Vec::with_capacity(request.max_rounds as usize);
    let mut correction: Option<Correction> = None;
    let mut rounds_used = 0u32;

    for round in 1..=request.max_rounds {
        let instructions = match (correction, history.last()) {
            (Some(Correction::Condense { excess }), Some(previous)) => {
                build_condense_instructions(previous, excess, request)
            }
            (Some(Correction::Expand { deficit }), Some(previous)) => {
                build_expand_instructions(previous, deficit, request)
            }
            _ => build_draft_instructions(&source, source_length, request),
        };

        rounds_used += 1;
        let text = match call_oracle(oracle, &instructions, request, round).await {
            Ok(text) => text,
            Err(e) => {
                warn!(round, error = %e, "Oracle call failed, aborting run");
                return Ok(ConvergenceReport {
                    outcome: ConvergenceOutcome::OracleFailed(e),
                    history,
                    rounds_used,
                });
            }
        };

        let candidate = Candidate::new(&text, round);
        let verdict = evaluate(candidate.normalized_length, request);
        debug!(
            round,
            length = candidate.normalized_length,
            target,
            ?verdict,
            "Evaluated candidate"
        );

        correction = match verdict {
            Verdict::WithinTolerance => {
                let final_candidate = candidate.capped(target);
                history.push(candidate);
                info!(
                    round,
                    length = final_candidate.normalized_length,
                    target,
                    "Converged within tolerance"
                );
                return Ok(ConvergenceReport {
                    outcome: ConvergenceOutcome::Converged(final_candidate),
                    history,
                    rounds_used,
                });
            }
            Verdict::Overshoot { excess } => Some(Correction::Condense { excess }),
            Verdict::Undershoot { deficit } => Some(Correction::Expand { deficit }),
        };
        history.push(candidate);
    }

    let best = select_best(&history, target)
        .cloned()
        .unwrap_or_else(|| Candidate::new(&source, 0));
    let final_candidate = best.capped(target);

    warn!(
        rounds = rounds_used,
        best_round = best.round,
        best_length = best.normalized_length,
        final_length = final_candidate.normalized_length,
        target,
        "Round budget exhausted, keeping best candidate"
    );

    Ok(ConvergenceReport {
        outcome: ConvergenceOutcome::ExhaustedRounds(final_candidate),
        history,
        rounds_used,
    })
}

/// Calls the oracle once. A malformed answer becomes an empty string.
async fn call_oracle(
    oracle: &dyn RewriteOracle,
    instructions: &Instructions,
    request: &AdjustmentRequest,
    round: u32,
) -> Result<String, OracleError> {
    match oracle
        .rewrite(&instructions.system, &instructions.user, &request.model)
        .await
    {
        Ok(reply) => Ok(reply.text),
        Err(OracleError::Malformed(reason)) => {
            warn!(round, %reason, "Malformed oracle response, treating as empty candidate");
            Ok(String::new())
        }
        Err(e) => Err(e),
    }
}

/// Closest candidate at or below the target; if every candidate overshoots,
/// the one with the smallest overshoot.
pub(crate) fn select_best(history: &[Candidate], target: usize) -> Option<&Candidate> {
    history
        .iter()
        .filter(|c| c.normalized_length <= target)
        .max_by_key(|c| c.normalized_length)
        .or_else(|| history.iter().min_by_key(|c| c.normalized_length))
}

// ────────────────────────────────────────────────────────────────────────────
// Instruction builders
// ────────────────────────────────────────────────────────────────────────────

pub(crate) fn build_draft_instructions(
    source: &str,
    source_length: usize,
    request: &AdjustmentRequest,
) -> Instructions {
    let target = request.target_length.to_string();
    let lower_bound = request.lower_bound().to_string();

    let strategy = if source_length > request.target_length {
        CONDENSE_STRATEGY
    } else {
        EXPAND_STRATEGY
    }
    .replace("{lower_bound}", &lower_bound)
    .replace("{target}", &target);

    let system = DRAFT_SYSTEM_TEMPLATE
        .replace("{lower_bound}", &lower_bound)
        .replace("{upper_bound}", &request.upper_bound().to_string())
        .replace("{target}", &target)
        .replace(
            "{lower_percent}",
            &format_percent(request.tolerance.lower_fraction * 100.0),
        )
        .replace("{counting_rules}", COUNTING_RULES)
        .replace("{must_keep}", &must_keep_fragment(&request.must_keep));

    let signed_delta = request.target_length as i64 - source_length as i64;
    let user = DRAFT_USER_TEMPLATE
        .replace("{source_length}", &source_length.to_string())
        .replace("{target}", &target)
        .replace("{lower_bound}", &lower_bound)
        .replace("{signed_delta}", &format!("{signed_delta:+}"))
        .replace("{strategy}", &strategy)
        .replace("{source_text}", source);

    Instructions { system, user }
}

pub(crate) fn build_condense_instructions(
    previous: &Candidate,
    excess: usize,
    request: &AdjustmentRequest,
) -> Instructions {
    let target = request.target_length.to_string();
    let length = previous.normalized_length.to_string();
    let lower_bound = request.lower_bound().to_string();
    let excess_percent = excess as f64 / request.target_length as f64 * 100.0;

    let system = CONDENSE_SYSTEM_TEMPLATE
        .replace("{length}", &length)
        .replace("{target}", &target)
        .replace("{excess}", &excess.to_string())
        .replace("{excess_percent}", &format_percent(excess_percent))
        .replace("{lower_bound}", &lower_bound)
        .replace("{upper_bound}", &request.upper_bound().to_string())
        .replace("{must_keep}", &must_keep_fragment(&request.must_keep));

    let user = CONDENSE_USER_TEMPLATE
        .replace("{length}", &length)
        .replace("{lower_bound}", &lower_bound)
        .replace("{target}", &target)
        .replace("{text}", &previous.text);

    Instructions { system, user }
}

pub(crate) fn build_expand_instructions(
    previous: &Candidate,
    deficit: usize,
    request: &AdjustmentRequest,
) -> Instructions {
    let target = request.target_length.to_string();
    let length = previous.normalized_length.to_string();
    let desired = request.upper_bound().to_string();
    let fill_percent = previous.normalized_length as f64 / request.target_length as f64 * 100.0;

    let system = EXPAND_SYSTEM_TEMPLATE
        .replace("{length}", &length)
        .replace("{fill_percent}", &format_percent(fill_percent))
        .replace("{deficit}", &deficit.to_string())
        .replace("{desired}", &desired)
        .replace("{target}", &target)
        .replace("{must_keep}", &must_keep_fragment(&request.must_keep));

    let user = EXPAND_USER_TEMPLATE
        .replace("{length}", &length)
        .replace("{deficit}", &deficit.to_string())
        .replace("{desired}", &desired)
        .replace("{target}", &target)
        .replace("{text}", &previous.text);

    Instructions { system, user }
}

// ────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ────────────────────────────────────────────────────────────────────────────

fn must_keep_fragment(terms: &[String]) -> String {
    let terms: Vec<&str> = terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        String::new()
    } else {
        MUST_KEEP_FRAGMENT.replace("{terms}", &terms.join("; "))
    }
}

/// One decimal place, dropping a trailing ".0".
fn format_percent(value: f64) -> String {
    let formatted = format!("{value:.1}");
    formatted
        .strip_suffix(".0")
        .map(str::to_string)
        .unwrap_or(formatted)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::request::ToleranceBand;
    use crate::length::char_count;
    use crate::oracle::mock::{filler, ScriptedOracle};

    fn request(source_len: usize, target: usize) -> AdjustmentRequest {
        AdjustmentRequest::new(filler(source_len), target)
    }

    // ── evaluate ────────────────────────────────────────────────────────────

    #[test]
    fn test_evaluate_classifies_lengths() {
        let req = request(500, 300);
        assert_eq!(evaluate(300, &req), Verdict::WithinTolerance);
        assert_eq!(evaluate(285, &req), Verdict::WithinTolerance);
        assert_eq!(evaluate(301, &req), Verdict::Overshoot { excess: 1 });
        assert_eq!(evaluate(200, &req), Verdict::Undershoot { deficit: 100 });
        assert_eq!(evaluate(0, &req), Verdict::Undershoot { deficit: 300 });
    }

    #[test]
    fn test_evaluate_deficit_targets_upper_bound() {
        let mut req = request(500, 500);
        req.tolerance = ToleranceBand::new(0.10, 0.02);
        // upper bound 490
        assert_eq!(evaluate(400, &req), Verdict::Undershoot { deficit: 90 });
    }

    // ── scenarios ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_converges_on_first_round_when_oracle_hits_target() {
        let oracle = ScriptedOracle::constant(filler(300));
        let report = run_convergence_loop(&request(500, 300), &oracle).await.unwrap();

        assert_eq!(oracle.call_count(), 1);
        assert_eq!(report.rounds_used, 1);
        match report.outcome {
            ConvergenceOutcome::Converged(c) => {
                assert_eq!(c.normalized_length, 300);
                assert_eq!(c.round, 1);
                assert_eq!(c.text, filler(300));
            }
            other => panic!("expected Converged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oracle_that_never_shrinks_exhausts_rounds_and_is_capped() {
        let oracle = ScriptedOracle::constant(filler(500));
        let report = run_convergence_loop(&request(500, 300), &oracle).await.unwrap();

        assert_eq!(oracle.call_count(), 6);
        assert_eq!(report.history.len(), 6);
        let calls = oracle.calls();
        assert!(calls[1..]
            .iter()
            .all(|c| c.system.contains("TEXT ABOVE THE LIMIT")));
        match report.outcome {
            ConvergenceOutcome::ExhaustedRounds(c) => {
                assert!(c.normalized_length <= 300);
                assert!(c.normalized_length > 0);
            }
            other => panic!("expected ExhaustedRounds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_responses_are_empty_candidates() {
        let oracle = ScriptedOracle::new(|_| Err(OracleError::Malformed("no text".to_string())));
        let report = run_convergence_loop(&request(500, 300), &oracle).await.unwrap();

        assert_eq!(oracle.call_count(), 6);
        assert!(report.history.iter().all(|c| c.normalized_length == 0));
        let calls = oracle.calls();
        assert!(calls[1..]
            .iter()
            .all(|c| c.system.contains("MISSING: 300 characters")));
        match report.outcome {
            ConvergenceOutcome::ExhaustedRounds(c) => {
                assert_eq!(c.text, "");
                assert_eq!(c.normalized_length, 0);
            }
            other => panic!("expected ExhaustedRounds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_string_answers_never_loop_past_budget() {
        let oracle = ScriptedOracle::constant("");
        let mut req = request(500, 300);
        req.max_rounds = 4;
        let report = run_convergence_loop(&req, &oracle).await.unwrap();

        assert_eq!(oracle.call_count(), 4);
        assert!(matches!(
            report.outcome,
            ConvergenceOutcome::ExhaustedRounds(_)
        ));
    }

    #[tokio::test]
    async fn test_rate_limit_aborts_with_hint_and_no_further_calls() {
        let oracle = ScriptedOracle::new(|_| {
            Err(OracleError::RateLimited {
                retry_after_secs: Some(30),
            })
        });
        let report = run_convergence_loop(&request(500, 300), &oracle).await.unwrap();

        assert_eq!(oracle.call_count(), 1);
        assert_eq!(report.rounds_used, 1);
        assert!(report.history.is_empty());
        assert!(matches!(
            report.outcome,
            ConvergenceOutcome::OracleFailed(OracleError::RateLimited {
                retry_after_secs: Some(30)
            })
        ));
    }

    #[tokio::test]
    async fn test_target_below_minimum_is_rejected_without_calls() {
        let oracle = ScriptedOracle::constant(filler(5));
        let result = run_convergence_loop(&request(500, 5), &oracle).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_blank_source_is_rejected_without_calls() {
        let oracle = ScriptedOracle::constant(filler(100));
        let req = AdjustmentRequest::new("  \r\n  ", 100);
        let result = run_convergence_loop(&req, &oracle).await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_mid_run_keeps_history() {
        let oracle = ScriptedOracle::new(|call| {
            if call.index == 0 {
                Ok(filler(400))
            } else {
                Err(OracleError::Unavailable {
                    status: Some(503),
                    message: "down".to_string(),
                })
            }
        });
        let report = run_convergence_loop(&request(500, 300), &oracle).await.unwrap();

        assert_eq!(oracle.call_count(), 2);
        assert_eq!(report.rounds_used, 2);
        assert_eq!(report.history.len(), 1);
        assert!(report.final_candidate().is_none());
        assert!(matches!(
            report.outcome,
            ConvergenceOutcome::OracleFailed(OracleError::Unavailable { .. })
        ));
    }

    // ── correction rounds ───────────────────────────────────────────────────

    #[tokio::test]
    async fn test_overshoot_then_converge() {
        let oracle = ScriptedOracle::sequence(vec![filler(340), filler(296)]);
        let report = run_convergence_loop(&request(500, 300), &oracle).await.unwrap();

        assert_eq!(oracle.call_count(), 2);
        let calls = oracle.calls();
        assert!(calls[1].system.contains("over by 40 characters"));
        assert!(calls[1].user.contains(&filler(340)));
        match report.outcome {
            ConvergenceOutcome::Converged(c) => {
                assert_eq!(c.normalized_length, 296);
                assert_eq!(c.round, 2);
            }
            other => panic!("expected Converged, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undershoot_requests_exact_deficit() {
        let oracle = ScriptedOracle::sequence(vec![filler(200), filler(290)]);
        let report = run_convergence_loop(&request(500, 300), &oracle).await.unwrap();

        let calls = oracle.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].user.contains("ADD EXACTLY: 100 characters"));
        assert!(calls[1].system.contains("66.7% of the target"));
        assert!(matches!(report.outcome, ConvergenceOutcome::Converged(_)));
    }

    #[tokio::test]
    async fn test_issues_at_most_max_rounds_calls() {
        for k in 1..=5 {
            let oracle = ScriptedOracle::constant(filler(1000));
            let mut req = request(500, 300);
            req.max_rounds = k;
            let report = run_convergence_loop(&req, &oracle).await.unwrap();
            assert_eq!(oracle.call_count(), k as usize);
            assert_eq!(report.rounds_used, k);
        }
    }

    #[tokio::test]
    async fn test_exhausted_keeps_closest_non_overshooting_candidate() {
        let oracle = ScriptedOracle::sequence(vec![
            filler(400),
            filler(250),
            filler(270),
            filler(320),
        ]);
        let mut req = request(500, 300);
        req.max_rounds = 4;
        let report = run_convergence_loop(&req, &oracle).await.unwrap();

        match report.outcome {
            ConvergenceOutcome::ExhaustedRounds(c) => {
                assert_eq!(c.round, 3);
                assert_eq!(c.normalized_length, 270);
            }
            other => panic!("expected ExhaustedRounds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exhausted_with_only_overshoots_keeps_smallest_and_caps() {
        let oracle = ScriptedOracle::sequence(vec![filler(450), filler(320), filler(380)]);
        let mut req = request(500, 300);
        req.max_rounds = 3;
        let report = run_convergence_loop(&req, &oracle).await.unwrap();

        match report.outcome {
            ConvergenceOutcome::ExhaustedRounds(c) => {
                assert_eq!(c.round, 2);
                assert!(c.normalized_length <= 300);
            }
            other => panic!("expected ExhaustedRounds, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_final_text_never_exceeds_target() {
        for len in [0, 150, 299, 300, 301, 777, 5000] {
            let oracle = ScriptedOracle::constant(filler(len));
            let report = run_convergence_loop(&request(500, 300), &oracle).await.unwrap();
            let candidate = report.final_candidate().unwrap();
            assert!(char_count(&candidate.text) <= 300, "len {len} escaped the cap");
        }
    }

    // ── instruction builders ────────────────────────────────────────────────

    #[test]
    fn test_draft_prompt_condenses_long_source() {
        let req = request(500, 300);
        let source = normalize(&req.source_text);
        let instructions = build_draft_instructions(&source, 500, &req);

        assert!(instructions.user.contains("ORIGINAL TEXT (500 characters)"));
        assert!(instructions.user.contains("Change needed: -200 characters"));
        assert!(instructions.user.contains("LONGER than the target"));
        assert!(instructions.system.contains("BETWEEN 285 and 300 characters"));
        assert!(instructions.system.contains("[-5%, 0%]"));
    }

    #[test]
    fn test_draft_prompt_expands_short_source() {
        let req = request(100, 300);
        let source = normalize(&req.source_text);
        let instructions = build_draft_instructions(&source, 100, &req);

        assert!(instructions.user.contains("Change needed: +200 characters"));
        assert!(instructions.user.contains("SHORTER than the target"));
    }

    #[test]
    fn test_must_keep_terms_reach_every_prompt() {
        let mut req = request(500, 300);
        req.must_keep = vec!["CNN Portugal".to_string(), "  ".to_string(), "75 %".to_string()];
        let previous = Candidate::new(&filler(400), 1);

        let draft = build_draft_instructions(&req.source_text, 500, &req);
        let condense = build_condense_instructions(&previous, 100, &req);
        let expand = build_expand_instructions(&previous, 50, &req);

        for system in [draft.system, condense.system, expand.system] {
            assert!(system.contains("MUST APPEAR VERBATIM IN THE OUTPUT: CNN Portugal; 75 %"));
        }
    }

    #[test]
    fn test_source_text_with_braces_is_not_substituted() {
        let mut req = AdjustmentRequest::new("literal {target} and {lower_bound} braces", 100);
        req.max_rounds = 1;
        let source = normalize(&req.source_text);
        let instructions = build_draft_instructions(&source, 41, &req);
        assert!(instructions
            .user
            .contains("literal {target} and {lower_bound} braces"));
    }

    #[test]
    fn test_format_percent() {
        assert_eq!(format_percent(5.0), "5");
        assert_eq!(format_percent(3.5), "3.5");
        assert_eq!(format_percent(66.666), "66.7");
    }
}
