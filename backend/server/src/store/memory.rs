use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use chrono::Duration;

use super::{CounterStore, SessionStore};
use crate::{
    error::{CoreError, Result},
    model::{Counter, Precondition, Session},
    utils::Clock,
};

#[derive(Default)]
pub struct MemoryCounters {
    counts: Mutex<HashMap<Counter, i64>>,
    pub fail: AtomicBool,
}

impl MemoryCounters {
    pub fn with(counts: &[(Counter, i64)]) -> Self {
        Self {
            counts: Mutex::new(counts.iter().copied().collect()),
            fail: AtomicBool::new(false),
        }
    }

    pub fn value(&self, counter: Counter) -> Option<i64> {
        self.counts.lock().unwrap().get(&counter).copied()
    }

    fn check(&self) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::StoreUnavailable("counters offline".into()));
        }

        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryCounters {
    async fn get_count(&self, counter: Counter) -> Result<i64> {
        self.check()?;

        self.value(counter)
            .ok_or_else(|| CoreError::NotFound(counter.to_string()))
    }

    async fn increment(&self, counter: Counter) -> Result<i64> {
        self.check()?;

        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(counter).or_insert(0);
        *count += 1;

        Ok(*count)
    }

    async fn decrement(&self, counter: Counter) -> Result<i64> {
        self.check()?;

        let mut counts = self.counts.lock().unwrap();
        let count = counts
            .get_mut(&counter)
            .ok_or_else(|| CoreError::NotFound(counter.to_string()))?;

        if *count > 0 {
            *count -= 1;
        }

        Ok(*count)
    }

    async fn seed(&self, counter: Counter) -> Result<()> {
        self.check()?;

        self.counts.lock().unwrap().entry(counter).or_insert(0);

        Ok(())
    }
}

pub struct MemorySessions {
    rows: Mutex<HashMap<String, Session>>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    pub fail_updates: AtomicBool,
    /// Removes the row ahead of the next update, as a key dropped by its expiry would be.
    pub drop_before_update: AtomicBool,
}

impl MemorySessions {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            clock,
            ttl: Duration::hours(24),
            fail_updates: AtomicBool::new(false),
            drop_before_update: AtomicBool::new(false),
        }
    }

    /// Raw row, expired or not.
    pub fn row(&self, session_id: &str) -> Option<Session> {
        self.rows.lock().unwrap().get(session_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionStore for MemorySessions {
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let now = self.clock.now();

        Ok(self.row(session_id).filter(|s| !s.is_expired(now)))
    }

    async fn create_session(&self, session_id: &str) -> Result<Session> {
        let session = Session::new(session_id.to_string(), self.clock.now(), self.ttl);

        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(session_id) {
            return Err(CoreError::StoreUnavailable("session already exists".into()));
        }
        rows.insert(session_id.to_string(), session.clone());

        Ok(session)
    }

    async fn update_session_if(
        &self,
        session: &mut Session,
        precondition: Precondition,
    ) -> Result<bool> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(CoreError::StoreUnavailable("sessions offline".into()));
        }

        let now = self.clock.now();
        let mut rows = self.rows.lock().unwrap();
        if self.drop_before_update.swap(false, Ordering::SeqCst) {
            rows.remove(&session.session_id);
        }

        let row = rows
            .get_mut(&session.session_id)
            .filter(|row| !row.is_expired(now))
            .ok_or(CoreError::InvalidSession)?;

        match precondition {
            Precondition::None => {
                row.has_visited = session.has_visited;
                row.has_liked = session.has_liked;
            }
            Precondition::VisitedIs(expected) if row.has_visited == expected => {
                row.has_visited = session.has_visited;
            }
            Precondition::LikedIs(expected) if row.has_liked == expected => {
                row.has_liked = session.has_liked;
            }
            _ => return Ok(false),
        }

        session.updated_at = now;
        row.updated_at = session.updated_at;

        Ok(true)
    }
}
