use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::errors::AppError;
use crate::session::models::Session;

/// In-memory session registry.
///
/// The lock is only held for short synchronous edits; callers must never hold it
/// across an oracle call.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub async fn create(&self, text: &str) -> Result<Session, AppError> {
        let session = Session::from_text(text)?;
        self.inner
            .write()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, session_id: Uuid) -> Result<Session, AppError> {
        self.inner
            .read()
            .await
            .get(&session_id)
            .cloned()
            .ok_or_else(|| not_found(session_id))
    }

    /// Drops the session and all paragraph history.
    pub async fn remove(&self, session_id: Uuid) -> Result<(), AppError> {
        self.inner
            .write()
            .await
            .remove(&session_id)
            .map(|_| ())
            .ok_or_else(|| not_found(session_id))
    }

    /// Applies `edit` to the session under the write lock and bumps `updated_at`
    /// if it succeeds.
    pub async fn update<T, F>(&self, session_id: Uuid, edit: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Session) -> Result<T, AppError>,
    {
        let mut sessions = self.inner.write().await;
        let session = sessions
            .get_mut(&session_id)
            .ok_or_else(|| not_found(session_id))?;
        let result = edit(session)?;
        session.touch();
        Ok(result)
    }
}

fn not_found(session_id: Uuid) -> AppError {
    AppError::NotFound(format!("Session {session_id} not found"))
}
