//! # Redis
//!
//! RAM database.
//!
//! Core purpose is to hold the visitor/like counters and visitor sessions. Also, used for atomic increment/decrements.
//!
//! ## Requirements
//!
//! - Fast lookups
//! - Tiny dataset, two counters plus one small hash per live session
//! - Every counter mutation is a single atomic request, never a read-then-write
//!
//! ## Implementation
//!
//! - Counters: 1 Redis hash (`COUNTERS_TABLE`), one field per counter
//! - Increment is a plain `HINCRBY`, a missing field starts at 0
//! - Decrement is a Lua script, Redis runs scripts atomically so the floor-at-zero check and the write can't interleave
//! - Sessions: 1 Redis hash per session at `SESSION_TABLE:id`
//! - Session rows carry `PEXPIREAT` so Redis drops them, expiry is still checked on every read
//! - Conditional session writes are Lua scripts as well, only the guarded flag is written
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, LazyLock},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use redis::{
    AsyncCommands, Client, RedisResult, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::{
    error::{CoreError, Result},
    model::{Counter, Precondition, Session},
    store::{CounterStore, SessionStore},
    utils::Clock,
};

pub const SESSION_ID: &str = "SessionID";
pub const HAS_VISITED: &str = "HasVisited";
pub const HAS_LIKED: &str = "HasLiked";
pub const EXPIRES_AT: &str = "ExpiresAt";
pub const CREATED_AT: &str = "CreatedAt";
pub const UPDATED_AT: &str = "UpdatedAt";

/// KEYS[1] counters hash, ARGV[1] counter name.
/// nil when the counter does not exist.
const DECREMENT: &str = r#"
    local current = tonumber(redis.call('HGET', KEYS[1], ARGV[1]))
    if current == nil then
        return false
    end
    if current > 0 then
        return redis.call('HINCRBY', KEYS[1], ARGV[1], -1)
    end
    return current
"#;

/// KEYS[1] session key, ARGV: id, expires at, now, expires at in unix ms.
/// 0 when the key is already taken.
const CREATE_SESSION: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 1 then
        return 0
    end
    redis.call('HSET', KEYS[1],
        'SessionID', ARGV[1],
        'HasVisited', 'false',
        'HasLiked', 'false',
        'ExpiresAt', ARGV[2],
        'CreatedAt', ARGV[3],
        'UpdatedAt', ARGV[3])
    redis.call('PEXPIREAT', KEYS[1], ARGV[4])
    return 1
"#;

/// KEYS[1] session key, ARGV: visited, liked, now, guarded field (may be empty), expected value.
/// -1 missing row, 0 precondition failed, 1 written.
/// With a guarded field only that flag is written.
const UPDATE_SESSION: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end
    if ARGV[4] == '' then
        redis.call('HSET', KEYS[1], 'HasVisited', ARGV[1], 'HasLiked', ARGV[2], 'UpdatedAt', ARGV[3])
        return 1
    end
    if redis.call('HGET', KEYS[1], ARGV[4]) ~= ARGV[5] then
        return 0
    end
    local value = ARGV[2]
    if ARGV[4] == 'HasVisited' then
        value = ARGV[1]
    end
    redis.call('HSET', KEYS[1], ARGV[4], value, 'UpdatedAt', ARGV[3])
    return 1
"#;

static DECREMENT_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(DECREMENT));
static CREATE_SESSION_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(CREATE_SESSION));
static UPDATE_SESSION_SCRIPT: LazyLock<Script> = LazyLock::new(|| Script::new(UPDATE_SESSION));

pub async fn init_redis(redis_url: &str) -> RedisResult<ConnectionManager> {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url)?;

    client.get_connection_manager_with_config(config).await
}

/// Dropping the returned future, or running past `limit`, commits nothing on our side.
async fn with_deadline<T, F>(limit: Duration, operation: F) -> Result<T>
where
    F: Future<Output = RedisResult<T>>,
{
    Ok(timeout(limit, operation).await??)
}

pub struct RedisCounterStore {
    connection: ConnectionManager,
    key: String,
    deadline: Duration,
}

impl RedisCounterStore {
    pub fn new(connection: ConnectionManager, key: impl Into<String>, deadline: Duration) -> Self {
        Self {
            connection,
            key: key.into(),
            deadline,
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn get_count(&self, counter: Counter) -> Result<i64> {
        let mut connection = self.connection.clone();

        let count = with_deadline(
            self.deadline,
            connection.hget::<_, _, Option<i64>>(&self.key, counter.as_str()),
        )
        .await?;

        count.ok_or_else(|| CoreError::NotFound(counter.to_string()))
    }

    async fn increment(&self, counter: Counter) -> Result<i64> {
        let mut connection = self.connection.clone();

        with_deadline(
            self.deadline,
            connection.hincr::<_, _, _, i64>(&self.key, counter.as_str(), 1),
        )
        .await
    }

    async fn decrement(&self, counter: Counter) -> Result<i64> {
        let mut connection = self.connection.clone();

        let count = with_deadline(
            self.deadline,
            DECREMENT_SCRIPT
                .key(&self.key)
                .arg(counter.as_str())
                .invoke_async::<Option<i64>>(&mut connection),
        )
        .await?;

        count.ok_or_else(|| CoreError::NotFound(counter.to_string()))
    }

    async fn seed(&self, counter: Counter) -> Result<()> {
        let mut connection = self.connection.clone();

        let created = with_deadline(
            self.deadline,
            connection.hset_nx::<_, _, _, bool>(&self.key, counter.as_str(), 0),
        )
        .await?;

        if created {
            info!("Seeded counter {counter} at 0");
        }

        Ok(())
    }
}

pub struct RedisSessionStore {
    connection: ConnectionManager,
    prefix: String,
    ttl: chrono::Duration,
    deadline: Duration,
    clock: Arc<dyn Clock>,
}

impl RedisSessionStore {
    pub fn new(
        connection: ConnectionManager,
        prefix: impl Into<String>,
        ttl: chrono::Duration,
        deadline: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connection,
            prefix: prefix.into(),
            ttl,
            deadline,
            clock,
        }
    }

    fn key(&self, session_id: &str) -> String {
        format!("{}:{}", self.prefix, session_id)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let mut connection = self.connection.clone();

        let fields = with_deadline(
            self.deadline,
            connection.hgetall::<_, HashMap<String, String>>(self.key(session_id)),
        )
        .await?;

        if fields.is_empty() {
            return Ok(None);
        }

        let Some(session) = parse_session(&fields) else {
            warn!("Malformed session row {session_id}, treating as absent");
            return Ok(None);
        };

        if session.is_expired(self.clock.now()) {
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn create_session(&self, session_id: &str) -> Result<Session> {
        let session = Session::new(session_id.to_string(), self.clock.now(), self.ttl);
        let mut connection = self.connection.clone();

        let created = with_deadline(
            self.deadline,
            CREATE_SESSION_SCRIPT
                .key(self.key(session_id))
                .arg(session_id)
                .arg(timestamp(session.expires_at))
                .arg(timestamp(session.created_at))
                .arg(session.expires_at.timestamp_millis())
                .invoke_async::<i64>(&mut connection),
        )
        .await?;

        if created != 1 {
            return Err(CoreError::StoreUnavailable(format!(
                "session {session_id} already exists"
            )));
        }

        Ok(session)
    }

    async fn update_session_if(
        &self,
        session: &mut Session,
        precondition: Precondition,
    ) -> Result<bool> {
        let now = self.clock.now();
        let (field, expected) = match precondition {
            Precondition::None => ("", false),
            Precondition::VisitedIs(expected) => (HAS_VISITED, expected),
            Precondition::LikedIs(expected) => (HAS_LIKED, expected),
        };
        let mut connection = self.connection.clone();

        let outcome = with_deadline(
            self.deadline,
            UPDATE_SESSION_SCRIPT
                .key(self.key(&session.session_id))
                .arg(flag(session.has_visited))
                .arg(flag(session.has_liked))
                .arg(timestamp(now))
                .arg(field)
                .arg(flag(expected))
                .invoke_async::<i64>(&mut connection),
        )
        .await?;

        match outcome {
            -1 => Err(CoreError::InvalidSession),
            0 => Ok(false),
            _ => {
                session.updated_at = now;
                Ok(true)
            }
        }
    }
}

fn flag(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// `None` for any missing or unreadable field.
pub fn parse_session(fields: &HashMap<String, String>) -> Option<Session> {
    let field = |name: &str| fields.get(name).map(String::as_str);
    let boolean = |name: &str| field(name)?.parse::<bool>().ok();

    let created_at = parse_timestamp(field(CREATED_AT)?)?;

    Some(Session {
        session_id: field(SESSION_ID)?.to_string(),
        has_visited: boolean(HAS_VISITED)?,
        has_liked: boolean(HAS_LIKED)?,
        expires_at: parse_timestamp(field(EXPIRES_AT)?)?,
        created_at,
        // rows written before their first update may lack it
        updated_at: field(UPDATED_AT)
            .and_then(parse_timestamp)
            .unwrap_or(created_at),
    })
}
