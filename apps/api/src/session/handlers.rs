use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::convergence::handlers::RunOverrides;
use crate::errors::AppError;
use crate::session::iterate::{iterate_all, iterate_paragraph, BatchIteration, ParagraphIteration};
use crate::session::models::{Paragraph, Session};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateSessionBody {
    pub text: String,
}

/// Body for both iterate routes. For the batch route `target_length` is the
/// total across all paragraphs.
#[derive(Debug, Deserialize)]
pub struct IterateBody {
    pub target_length: usize,
    #[serde(flatten)]
    pub overrides: RunOverrides,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevertBody {
    /// Omitted: step back one version.
    pub version_index: Option<usize>,
}

/// POST /api/v1/sessions
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionBody>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = state.sessions.create(&body.text).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.sessions.get(session_id).await?))
}

/// DELETE /api/v1/sessions/:id
///
/// Full reset: the session and every paragraph history are dropped.
pub async fn handle_delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.sessions.remove(session_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/paragraphs/:pid/iterate
pub async fn handle_iterate_paragraph(
    State(state): State<AppState>,
    Path((session_id, paragraph_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<IterateBody>,
) -> Result<Json<ParagraphIteration>, AppError> {
    let template = body
        .overrides
        .to_request(&state.config, String::new(), body.target_length);
    let result = iterate_paragraph(
        &state.sessions,
        Arc::clone(&state.oracle),
        session_id,
        paragraph_id,
        template,
    )
    .await?;
    Ok(Json(result))
}

/// POST /api/v1/sessions/:id/iterate
pub async fn handle_iterate_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<IterateBody>,
) -> Result<Json<BatchIteration>, AppError> {
    let template = body
        .overrides
        .to_request(&state.config, String::new(), body.target_length);
    let result =
        iterate_all(&state.sessions, Arc::clone(&state.oracle), session_id, template).await?;
    Ok(Json(result))
}

/// POST /api/v1/sessions/:id/paragraphs/:pid/revert
pub async fn handle_revert_paragraph(
    State(state): State<AppState>,
    Path((session_id, paragraph_id)): Path<(Uuid, Uuid)>,
    body: Option<Json<RevertBody>>,
) -> Result<Json<Paragraph>, AppError> {
    let version_index = body.and_then(|Json(b)| b.version_index);
    let paragraph = state
        .sessions
        .update(session_id, |session| {
            let paragraph = session.paragraph_mut(paragraph_id)?;
            match version_index {
                Some(index) => paragraph.revert_to(index)?,
                None => paragraph.revert_previous()?,
            }
            Ok(paragraph.clone())
        })
        .await?;
    Ok(Json(paragraph))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iterate_body_flattens_overrides() {
        let body: IterateBody = serde_json::from_value(serde_json::json!({
            "target_length": 300,
            "tolerance_lower": 0.1,
            "max_rounds": 2
        }))
        .unwrap();

        assert_eq!(body.target_length, 300);
        assert_eq!(body.overrides.tolerance_lower, Some(0.1));
        assert_eq!(body.overrides.max_rounds, Some(2));
        assert!(body.overrides.model.is_none());
    }

    #[test]
    fn test_revert_body_defaults_to_previous() {
        let body: RevertBody = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(body.version_index.is_none());
    }
}
