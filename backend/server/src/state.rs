use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use super::{
    config::Config,
    contact::ContactService,
    database::{RedisCounterStore, RedisSessionStore, init_redis},
    likes::LikeToggleController,
    model::Counter,
    notify::Notifier,
    session::SessionCoordinator,
    store::{CounterStore, SessionStore},
    utils::{Clock, IdGenerator, RandomIds, SystemClock},
    visits::VisitRecorder,
};

/// Built once at startup and shared by every request. Holds no per-request data.
pub struct AppState {
    pub counters: Arc<dyn CounterStore>,
    pub coordinator: SessionCoordinator,
    pub visits: VisitRecorder,
    pub likes: LikeToggleController,
    pub contact: ContactService,
    pub notifier: Arc<Notifier>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub session_ttl: chrono::Duration,
}

pub struct Collaborators {
    pub counters: Arc<dyn CounterStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub contact: ContactService,
    pub notifier: Notifier,
    pub session_ttl: chrono::Duration,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Arc<Self>> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let redis_connection = init_redis(&config.redis_url)
            .await
            .with_context(|| format!("Failed to connect to Redis at {}", config.redis_url))?;

        let counters = Arc::new(RedisCounterStore::new(
            redis_connection.clone(),
            config.counters_table.clone(),
            config.store_timeout,
        ));
        let sessions = Arc::new(RedisSessionStore::new(
            redis_connection,
            config.session_table.clone(),
            config.session_ttl,
            config.store_timeout,
            clock.clone(),
        ));

        if config.seed_counters {
            for counter in Counter::ALL {
                counters
                    .seed(counter)
                    .await
                    .with_context(|| format!("Failed to seed counter {counter}"))?;
            }
            info!("Counters ready");
        }

        Ok(Self::assemble(Collaborators {
            counters,
            sessions,
            clock,
            ids: Arc::new(RandomIds),
            contact: ContactService::new(config.recaptcha_secret.clone()),
            notifier: Notifier::new(config.notifications.clone()),
            session_ttl: config.session_ttl,
        }))
    }

    pub fn assemble(parts: Collaborators) -> Arc<Self> {
        Arc::new(Self {
            coordinator: SessionCoordinator::new(parts.sessions.clone(), parts.ids.clone()),
            visits: VisitRecorder::new(parts.counters.clone(), parts.sessions.clone()),
            likes: LikeToggleController::new(parts.counters.clone(), parts.sessions),
            counters: parts.counters,
            contact: parts.contact,
            notifier: Arc::new(parts.notifier),
            clock: parts.clock,
            ids: parts.ids,
            session_ttl: parts.session_ttl,
        })
    }
}
