//! # Likes
//!
//! Binary toggle, `liked <-> unliked`, paired with a `likes` increment or decrement.
//!
//! The flip is claimed on the session row first, conditional on `HasLiked` still holding the value
//! this request read, and only the winner moves the counter. Two requests toggling with the same
//! stale session flip once. The loser answers with the current count and the state the row is in.
//!
//! The decrement is floored at zero by the store, so a session that claims a like the counter
//! never saw still ends up unliked at 0.
use std::sync::Arc;

use tracing::warn;

use crate::{
    error::Result,
    model::{Counter, LikeAction, Precondition, Session},
    store::{CounterStore, SessionStore},
};

pub struct LikeToggleController {
    counters: Arc<dyn CounterStore>,
    sessions: Arc<dyn SessionStore>,
}

impl LikeToggleController {
    pub fn new(counters: Arc<dyn CounterStore>, sessions: Arc<dyn SessionStore>) -> Self {
        Self { counters, sessions }
    }

    pub async fn toggle_like(&self, session: &mut Session) -> Result<(i64, LikeAction)> {
        let was_liked = session.has_liked;
        let action = if was_liked {
            LikeAction::Unliked
        } else {
            LikeAction::Liked
        };

        session.has_liked = !was_liked;
        let claimed = self
            .sessions
            .update_session_if(session, Precondition::LikedIs(was_liked))
            .await
            .inspect_err(|_| session.has_liked = was_liked)?;

        if !claimed {
            // the row already holds the flipped state
            let count = self.counters.get_count(Counter::Likes).await?;
            return Ok((count, action));
        }

        let moved = match action {
            LikeAction::Liked => self.counters.increment(Counter::Likes).await,
            LikeAction::Unliked => self.counters.decrement(Counter::Likes).await,
        };

        match moved {
            Ok(count) => Ok((count, action)),
            Err(e) => {
                self.release(session, was_liked).await;
                Err(e)
            }
        }
    }

    async fn release(&self, session: &mut Session, was_liked: bool) {
        session.has_liked = was_liked;

        if let Err(e) = self
            .sessions
            .update_session_if(session, Precondition::LikedIs(!was_liked))
            .await
        {
            warn!(
                "Failed to release like claim for {}: {e}",
                session.session_id
            );
        }
    }
}
