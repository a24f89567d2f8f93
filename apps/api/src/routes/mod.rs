pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::convergence::handlers as adjust;
use crate::oracle::handlers as rewrite;
use crate::session::handlers as sessions;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route("/api/v1/adjust", post(adjust::handle_adjust))
        .route("/api/v1/rewrite", post(rewrite::handle_rewrite))
        // Paragraph sessions
        .route("/api/v1/sessions", post(sessions::handle_create_session))
        .route(
            "/api/v1/sessions/:id",
            get(sessions::handle_get_session).delete(sessions::handle_delete_session),
        )
        .route(
            "/api/v1/sessions/:id/iterate",
            post(sessions::handle_iterate_session),
        )
        .route(
            "/api/v1/sessions/:id/paragraphs/:pid/iterate",
            post(sessions::handle_iterate_paragraph),
        )
        .route(
            "/api/v1/sessions/:id/paragraphs/:pid/revert",
            post(sessions::handle_revert_paragraph),
        )
        .with_state(state)
}
