use super::session::InterviewSession;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Durable storage for session records
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &InterviewSession) -> Result<(), StoreError>;

    async fn load(&self, session_id: Uuid) -> Result<Option<InterviewSession>, StoreError>;

    /// Write `session` if the stored copy is still at `session.version`
    ///
    /// On success the version is bumped in place. Returns `Ok(false)` when the
    /// record changed underneath the caller, or when the stored copy is
    /// already terminal (terminal records are never rewritten).
    async fn update(&self, session: &mut InterviewSession) -> Result<bool, StoreError>;

    /// Sessions that are still `Pending` or `InProgress`
    async fn list_live(&self) -> Result<Vec<InterviewSession>, StoreError>;

    /// Every session of a user, oldest first
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<InterviewSession>, StoreError>;
}

/// In-process session repository
#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<Uuid, InterviewSession>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, InterviewSession>>, StoreError> {
        self.sessions
            .lock()
            .map_err(|_| StoreError::Unavailable("session repository lock poisoned".into()))
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn insert(&self, session: &InterviewSession) -> Result<(), StoreError> {
        self.lock()?.insert(session.session_id, session.clone());
        Ok(())
    }

    async fn load(&self, session_id: Uuid) -> Result<Option<InterviewSession>, StoreError> {
        Ok(self.lock()?.get(&session_id).cloned())
    }

    async fn update(&self, session: &mut InterviewSession) -> Result<bool, StoreError> {
        let mut sessions = self.lock()?;
        let Some(stored) = sessions.get(&session.session_id) else {
            return Err(StoreError::NotFound(format!("session {}", session.session_id)));
        };
        if stored.version != session.version || stored.state.is_terminal() {
            return Ok(false);
        }

        session.version += 1;
        sessions.insert(session.session_id, session.clone());
        Ok(true)
    }

    async fn list_live(&self) -> Result<Vec<InterviewSession>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .filter(|s| !s.state.is_terminal())
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<InterviewSession>, StoreError> {
        let mut sessions: Vec<InterviewSession> = self
            .lock()?
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }
}
