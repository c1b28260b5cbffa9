//! # Sessions
//!
//! Resolves the `session_id` cookie to a live session.
//!
//! - Empty cookie: new identifier, new session
//! - Unknown or expired identifier: new identifier, new session. The old identifier is never reused,
//!   so an expired session can't be brought back with fresh flags
//! - Live identifier: the stored session
//!
//! Mutation paths that must not create sessions use [`SessionCoordinator::validate`] instead.
use std::sync::Arc;

use tracing::debug;

use crate::{
    error::{CoreError, Result},
    model::Session,
    store::SessionStore,
    utils::IdGenerator,
};

pub struct SessionCoordinator {
    sessions: Arc<dyn SessionStore>,
    ids: Arc<dyn IdGenerator>,
}

impl SessionCoordinator {
    pub fn new(sessions: Arc<dyn SessionStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { sessions, ids }
    }

    /// The flag is true when a new session was created.
    pub async fn resolve(&self, raw_id: &str) -> Result<(Session, bool)> {
        if !raw_id.is_empty() {
            if let Some(session) = self.sessions.get_session(raw_id).await? {
                return Ok((session, false));
            }

            debug!("Session {raw_id} unknown or expired, issuing a new one");
        }

        let session = self.sessions.create_session(&self.ids.generate()).await?;

        Ok((session, true))
    }

    pub async fn validate(&self, raw_id: &str) -> Result<Option<Session>> {
        if raw_id.is_empty() {
            return Ok(None);
        }

        self.sessions.get_session(raw_id).await
    }

    /// Like [`validate`](Self::validate) but absence is an [`CoreError::InvalidSession`].
    pub async fn require(&self, raw_id: &str) -> Result<Session> {
        self.validate(raw_id).await?.ok_or(CoreError::InvalidSession)
    }

    pub async fn update_session(&self, session: &mut Session) -> Result<()> {
        self.sessions.update_session(session).await
    }
}
