//! Session store seam.
//!
//! The monitor runs against this trait so its guard logic is testable
//! with an in-memory store; [`PgSessionStore`] delegates to the
//! repository layer.

use async_trait::async_trait;

use quantdesk_db::models::session::{ActivateSession, SessionRecord};
use quantdesk_db::repositories::SessionRepo;
use quantdesk_db::DbPool;

/// Failures from the session store. All are transient from the
/// monitor's point of view -- it logs and waits for the next cycle.
#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("Session store unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for SessionStoreError {
    fn from(e: sqlx::Error) -> Self {
        Self::Unavailable(e.to_string())
    }
}

/// Session record access for one user's devices.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionStoreError>;

    /// Activate this device's session and deactivate every other session
    /// the user holds.
    async fn activate(&self, input: &ActivateSession) -> Result<SessionRecord, SessionStoreError>;

    async fn deactivate(&self, session_id: &str) -> Result<bool, SessionStoreError>;

    /// Refresh `last_seen`; `false` if the session is gone or inactive.
    async fn touch(&self, session_id: &str) -> Result<bool, SessionStoreError>;
}

/// Production store backed by the shared Postgres pool.
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn find(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionStoreError> {
        Ok(SessionRepo::find_by_session_id(&self.pool, session_id).await?)
    }

    async fn activate(&self, input: &ActivateSession) -> Result<SessionRecord, SessionStoreError> {
        Ok(SessionRepo::activate(&self.pool, input).await?)
    }

    async fn deactivate(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        Ok(SessionRepo::deactivate(&self.pool, session_id).await?)
    }

    async fn touch(&self, session_id: &str) -> Result<bool, SessionStoreError> {
        Ok(SessionRepo::touch(&self.pool, session_id).await?)
    }
}
