//! # Visits
//!
//! Each session moves the `visitors` counter at most once.
//!
//! The visit is claimed on the session row first, with a conditional write that only lands while
//! `HasVisited` is still false, and only the winner of that claim increments. Two requests racing
//! with the same session therefore count once. The loser answers `already_visited`.
//!
//! A returning visitor whose session expired gets a new session and is counted again.
use std::sync::Arc;

use tracing::warn;

use crate::{
    error::Result,
    model::{Counter, Precondition, Session, VisitAction},
    store::{CounterStore, SessionStore},
};

pub struct VisitRecorder {
    counters: Arc<dyn CounterStore>,
    sessions: Arc<dyn SessionStore>,
}

impl VisitRecorder {
    pub fn new(counters: Arc<dyn CounterStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { counters, sessions }
    }

    pub async fn record_visit(&self, session: &mut Session) -> Result<(i64, VisitAction)> {
        if session.has_visited {
            return self.already_visited().await;
        }

        session.has_visited = true;
        let claimed = self
            .sessions
            .update_session_if(session, Precondition::VisitedIs(false))
            .await
            .inspect_err(|_| session.has_visited = false)?;

        if !claimed {
            return self.already_visited().await;
        }

        match self.counters.increment(Counter::Visitors).await {
            Ok(count) => Ok((count, VisitAction::Incremented)),
            Err(e) => {
                self.release(session).await;
                Err(e)
            }
        }
    }

    async fn already_visited(&self) -> Result<(i64, VisitAction)> {
        let count = self.counters.get_count(Counter::Visitors).await?;

        Ok((count, VisitAction::AlreadyVisited))
    }

    /// Hands the claim back so a retry can count the visit.
    async fn release(&self, session: &mut Session) {
        session.has_visited = false;

        if let Err(e) = self
            .sessions
            .update_session_if(session, Precondition::VisitedIs(true))
            .await
        {
            warn!(
                "Failed to release visit claim for {}: {e}",
                session.session_id
            );
        }
    }
}
