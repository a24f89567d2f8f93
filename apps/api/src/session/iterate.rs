//! Oracle-driven session actions: single-paragraph and batch iteration.
//!
//! Pattern for every action: snapshot the paragraph text under the lock, run the
//! convergence loop with the lock released, then apply the result under the lock.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::convergence::request::{MAX_TARGET_LENGTH, MIN_TARGET_LENGTH};
use crate::convergence::{run_convergence_loop, AdjustmentRequest, OutcomeKind};
use crate::errors::AppError;
use crate::oracle::RewriteOracle;
use crate::session::models::{distribute_target, Paragraph, Session};
use crate::session::store::SessionStore;

/// Result of iterating one paragraph.
#[derive(Debug, Clone, Serialize)]
pub struct ParagraphIteration {
    pub paragraph: Paragraph,
    pub outcome_kind: OutcomeKind,
    pub rounds_used: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParagraphFailure {
    pub paragraph_id: Uuid,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchIteration {
    pub session: Session,
    pub updated: Vec<Uuid>,
    pub failures: Vec<ParagraphFailure>,
}

/// Re-runs the convergence loop on one paragraph's current text.
///
/// `template` supplies everything except the source text, which is taken from the paragraph.
pub async fn iterate_paragraph(
    store: &SessionStore,
    oracle: Arc<dyn RewriteOracle>,
    session_id: Uuid,
    paragraph_id: Uuid,
    template: AdjustmentRequest,
) -> Result<ParagraphIteration, AppError> {
    let source = store
        .get(session_id)
        .await?
        .paragraph(paragraph_id)?
        .current_text
        .clone();

    let mut request = template;
    request.source_text = source;

    let report = run_convergence_loop(&request, oracle.as_ref()).await?;
    let rounds_used = report.rounds_used;
    let exhausted = report.is_exhausted();
    let candidate = report.into_final()?;
    let outcome_kind = OutcomeKind::classify(&candidate, exhausted, request.target_length);

    let paragraph = store
        .update(session_id, |session| {
            let paragraph = session.paragraph_mut(paragraph_id)?;
            paragraph.push_version(candidate.text);
            Ok(paragraph.clone())
        })
        .await?;

    info!(
        %session_id,
        %paragraph_id,
        rounds_used,
        length = paragraph.current_length(),
        "Paragraph iterated"
    );

    Ok(ParagraphIteration {
        paragraph,
        outcome_kind,
        rounds_used,
    })
}

/// Iterates every paragraph concurrently. `template.target_length` is the total
/// for the whole session and is shared out in proportion to paragraph lengths.
///
/// Paragraphs whose run fails keep their current text and are reported in `failures`.
pub async fn iterate_all(
    store: &SessionStore,
    oracle: Arc<dyn RewriteOracle>,
    session_id: Uuid,
    template: AdjustmentRequest,
) -> Result<BatchIteration, AppError> {
    let total_target = template.target_length;
    if !(MIN_TARGET_LENGTH..=MAX_TARGET_LENGTH).contains(&total_target) {
        return Err(AppError::Validation(format!(
            "target_length must be between {MIN_TARGET_LENGTH} and {MAX_TARGET_LENGTH}, got {total_target}"
        )));
    }

    let snapshot = store.get(session_id).await?;
    let needed = snapshot.paragraphs.len() * MIN_TARGET_LENGTH;
    if total_target < needed {
        return Err(AppError::Validation(format!(
            "target_length {total_target} is too small for {} paragraphs (needs at least {needed})",
            snapshot.paragraphs.len()
        )));
    }

    let lengths: Vec<usize> = snapshot
        .paragraphs
        .iter()
        .map(Paragraph::current_length)
        .collect();
    let targets = distribute_target(&lengths, total_target);

    let mut runs = JoinSet::new();
    for (paragraph, target_length) in snapshot.paragraphs.iter().zip(targets) {
        let mut request = template.clone();
        request.source_text = paragraph.current_text.clone();
        request.target_length = target_length;
        let paragraph_id = paragraph.id;
        let oracle = Arc::clone(&oracle);

        runs.spawn(async move {
            let result = run_convergence_loop(&request, oracle.as_ref())
                .await
                .and_then(|report| report.into_final().map_err(AppError::from));
            (paragraph_id, result)
        });
    }

    let mut rewritten: Vec<(Uuid, String)> = Vec::new();
    let mut failures: Vec<ParagraphFailure> = Vec::new();

    while let Some(joined) = runs.join_next().await {
        let (paragraph_id, result) = joined.map_err(|e| {
            AppError::Internal(anyhow::anyhow!("paragraph iteration task failed: {e}"))
        })?;
        match result {
            Ok(candidate) => rewritten.push((paragraph_id, candidate.text)),
            Err(e) => {
                warn!(%session_id, %paragraph_id, error = %e, "Paragraph iteration failed");
                failures.push(ParagraphFailure {
                    paragraph_id,
                    error: e.to_string(),
                });
            }
        }
    }

    let updated: Vec<Uuid> = rewritten.iter().map(|(id, _)| *id).collect();
    let session = store
        .update(session_id, |session| {
            for (paragraph_id, text) in rewritten {
                session.paragraph_mut(paragraph_id)?.push_version(text);
            }
            Ok(session.clone())
        })
        .await?;

    info!(
        %session_id,
        updated = updated.len(),
        failed = failures.len(),
        "Batch iteration finished"
    );

    Ok(BatchIteration {
        session,
        updated,
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::length::char_count;
    use crate::oracle::mock::{filler, ScriptedOracle};
    use crate::oracle::OracleError;

    async fn session_with(store: &SessionStore, paragraphs: &[usize]) -> Session {
        let text = paragraphs
            .iter()
            .map(|&len| filler(len).trim().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        store.create(&text).await.unwrap()
    }

    #[tokio::test]
    async fn test_iterate_paragraph_appends_version() {
        let store = SessionStore::default();
        let session = session_with(&store, &[200, 120]).await;
        let pid = session.paragraphs[0].id;
        let oracle: Arc<dyn RewriteOracle> = Arc::new(ScriptedOracle::constant(filler(100)));

        let result = iterate_paragraph(
            &store,
            oracle,
            session.id,
            pid,
            AdjustmentRequest::new(String::new(), 100),
        )
        .await
        .unwrap();

        assert_eq!(result.outcome_kind, OutcomeKind::Exact);
        assert_eq!(result.rounds_used, 1);
        assert_eq!(result.paragraph.history.len(), 2);
        assert_eq!(result.paragraph.current_version_index, 1);
        assert_eq!(result.paragraph.current_length(), 100);

        let fetched = store.get(session.id).await.unwrap();
        assert_eq!(fetched.paragraphs[0].current_text, filler(100));
        assert_eq!(fetched.paragraphs[1].history.len(), 1);
    }

    #[tokio::test]
    async fn test_iterate_paragraph_oracle_failure_leaves_history() {
        let store = SessionStore::default();
        let session = session_with(&store, &[200]).await;
        let pid = session.paragraphs[0].id;
        let oracle: Arc<dyn RewriteOracle> = Arc::new(ScriptedOracle::new(|_| {
            Err(OracleError::RateLimited {
                retry_after_secs: None,
            })
        }));

        let result = iterate_paragraph(
            &store,
            oracle,
            session.id,
            pid,
            AdjustmentRequest::new(String::new(), 100),
        )
        .await;

        assert!(matches!(
            result,
            Err(AppError::Oracle(OracleError::RateLimited { .. }))
        ));
        let fetched = store.get(session.id).await.unwrap();
        assert_eq!(fetched.paragraphs[0].history.len(), 1);
    }

    #[tokio::test]
    async fn test_iterate_unknown_paragraph_is_not_found() {
        let store = SessionStore::default();
        let session = session_with(&store, &[50]).await;
        let oracle = Arc::new(ScriptedOracle::constant(filler(40)));

        let result = iterate_paragraph(
            &store,
            oracle.clone(),
            session.id,
            Uuid::new_v4(),
            AdjustmentRequest::new(String::new(), 40),
        )
        .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_iterate_all_caps_each_paragraph_to_its_share() {
        let store = SessionStore::default();
        let session = session_with(&store, &[300, 100]).await;
        let oracle: Arc<dyn RewriteOracle> = Arc::new(ScriptedOracle::constant(filler(500)));

        let mut template = AdjustmentRequest::new(String::new(), 200);
        template.max_rounds = 2;
        let batch = iterate_all(&store, oracle, session.id, template)
            .await
            .unwrap();

        assert_eq!(batch.updated.len(), 2);
        assert!(batch.failures.is_empty());
        let total: usize = batch
            .session
            .paragraphs
            .iter()
            .map(|p| char_count(&p.current_text))
            .sum();
        assert!(total <= 200, "total {total} exceeds the session target");
        assert!(batch.session.paragraphs.iter().all(|p| p.history.len() == 2));
    }

    #[tokio::test]
    async fn test_iterate_all_reports_failures_per_paragraph() {
        let store = SessionStore::default();
        let session = session_with(&store, &[120, 120]).await;
        let oracle: Arc<dyn RewriteOracle> = Arc::new(ScriptedOracle::new(|call| {
            if call.index == 0 {
                Err(OracleError::Unavailable {
                    status: None,
                    message: "connection reset".to_string(),
                })
            } else {
                Ok(filler(100))
            }
        }));

        let batch = iterate_all(
            &store,
            oracle,
            session.id,
            AdjustmentRequest::new(String::new(), 200),
        )
        .await
        .unwrap();

        assert_eq!(batch.updated.len(), 1);
        assert_eq!(batch.failures.len(), 1);
        assert!(batch.failures[0].error.contains("connection reset"));
    }

    #[tokio::test]
    async fn test_iterate_all_rejects_total_below_minimum() {
        let store = SessionStore::default();
        let session = session_with(&store, &[120, 120, 120]).await;
        let oracle = Arc::new(ScriptedOracle::constant(filler(5)));

        let result = iterate_all(
            &store,
            oracle.clone(),
            session.id,
            AdjustmentRequest::new(String::new(), 5),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(oracle.call_count(), 0);
        let fetched = store.get(session.id).await.unwrap();
        assert!(fetched.paragraphs.iter().all(|p| p.history.len() == 1));
    }

    #[tokio::test]
    async fn test_iterate_all_rejects_total_too_small_for_paragraph_count() {
        let store = SessionStore::default();
        let session = session_with(&store, &[120, 120, 120]).await;
        let oracle = Arc::new(ScriptedOracle::constant(filler(8)));

        let result = iterate_all(
            &store,
            oracle.clone(),
            session.id,
            AdjustmentRequest::new(String::new(), 25),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert_eq!(oracle.call_count(), 0);
    }

    #[tokio::test]
    async fn test_iterate_all_total_stays_within_target_for_uneven_paragraphs() {
        let store = SessionStore::default();
        let session = session_with(&store, &[12, 12, 400]).await;
        let oracle: Arc<dyn RewriteOracle> = Arc::new(ScriptedOracle::constant(filler(500)));

        let mut template = AdjustmentRequest::new(String::new(), 40);
        template.max_rounds = 1;
        let batch = iterate_all(&store, oracle, session.id, template)
            .await
            .unwrap();

        let total: usize = batch
            .session
            .paragraphs
            .iter()
            .map(|p| char_count(&p.current_text))
            .sum();
        assert!(total <= 40, "total {total} exceeds the session target");
    }
}
