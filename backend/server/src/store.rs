//! Store seams. The Redis implementations live in [`crate::database`].
use async_trait::async_trait;

use crate::{
    error::{CoreError, Result},
    model::{Counter, Precondition, Session},
};

#[cfg(test)]
pub mod memory;

#[async_trait]
pub trait CounterStore: Send + Sync {
    async fn get_count(&self, counter: Counter) -> Result<i64>;

    /// Single atomic add. Concurrent increments never lose updates.
    async fn increment(&self, counter: Counter) -> Result<i64>;

    /// Single atomic conditional subtract. At zero the value is left alone and returned.
    async fn decrement(&self, counter: Counter) -> Result<i64>;

    /// Creates the counter at zero if it does not exist yet.
    async fn seed(&self, counter: Counter) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Absent when there is no row, the row is malformed, or it has expired.
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>>;

    async fn create_session(&self, session_id: &str) -> Result<Session>;

    /// Writes `has_visited`, `has_liked` and a fresh `updated_at`, nothing else.
    /// With a precondition only the guarded flag is written.
    ///
    /// `Ok(false)` when the precondition no longer holds. A row that has vanished is
    /// never recreated: that is [`CoreError::InvalidSession`].
    async fn update_session_if(
        &self,
        session: &mut Session,
        precondition: Precondition,
    ) -> Result<bool>;

    async fn update_session(&self, session: &mut Session) -> Result<()> {
        match self.update_session_if(session, Precondition::None).await? {
            true => Ok(()),
            false => Err(CoreError::InvalidSession),
        }
    }
}
