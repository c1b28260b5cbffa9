//! # Session & Counter Model
//!
//! - Counters: named, non-negative integers. Only `visitors` and `likes` exist.
//! - Sessions: one per visitor, keyed by a 64 char hex identifier, alive until `expires_at`.
//!
//! A session past its expiry is the same as no session at all. Stores never hand one out.
use std::fmt;

use chrono::{DateTime, Utc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Counter {
    Visitors,
    Likes,
}

impl Counter {
    pub const ALL: [Counter; 2] = [Counter::Visitors, Counter::Likes];

    pub fn as_str(self) -> &'static str {
        match self {
            Counter::Visitors => "visitors",
            Counter::Likes => "likes",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub has_visited: bool,
    pub has_liked: bool,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Fresh session: neither visited nor liked.
    pub fn new(session_id: String, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        Self {
            session_id,
            has_visited: false,
            has_liked: false,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Guard for a conditional session write. The write only lands if the stored flag
/// still holds the expected value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Precondition {
    None,
    VisitedIs(bool),
    LikedIs(bool),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VisitAction {
    Incremented,
    AlreadyVisited,
}

impl VisitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            VisitAction::Incremented => "incremented",
            VisitAction::AlreadyVisited => "already_visited",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LikeAction {
    Liked,
    Unliked,
}

impl LikeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            LikeAction::Liked => "liked",
            LikeAction::Unliked => "unliked",
        }
    }
}
