//! Documentation of the portfolio site backend.
//!
//! Visitor counter, like counter, contact form, best-effort notifications.
//!
//!
//!
//! # General Infrastructure
//! - Stateless replicas behind the site's reverse proxy, any replica can take any request
//! - Redis is the only shared state, reached through a connection manager
//! - No in-process session cache, every request resolves its session from Redis
//! - Counter mutations are single atomic Redis requests, see [`database`]
//!
//!
//!
//! # Sessions
//!
//! **Goal**: Count each visitor once and keep likes from drifting, without multi-key transactions.
//!
//! - `session_id` cookie, 64 hex chars, `HttpOnly; Secure; SameSite=Strict`, 24 hours
//! - Malformed cookie values are dropped before they reach Redis
//! - Expired sessions are as good as missing, a new identifier is issued and the old one is dead for good
//! - A new session is NOT a visit, `/api/incrementCount` is what counts
//! - Liking requires an established session, `/api/toggleLike` without one is a 401
//!
//!
//!
//! # Request Flow
//!
//! 1. Cookie → [`session::SessionCoordinator`] resolves or validates the session
//! 2. [`visits::VisitRecorder`] or [`likes::LikeToggleController`] mutates counter + session
//! 3. Cookie goes back out with the (possibly new) identifier
//! 4. Notifications, if any, are spawned and forgotten
//!
//! Strictly sequential within one request. Nothing is retried here.
//!
//!
//!
//! # Routes
//!
//! | Method | Path | |
//! |---|---|---|
//! | GET | `/api/getCount` | visitor count |
//! | POST | `/api/incrementCount` | count this session's visit, at most once |
//! | GET | `/api/getLikes` | like count |
//! | POST | `/api/toggleLike` | like/unlike |
//! | GET | `/api/session` | session flags, creates a session if needed |
//! | POST | `/api/contact` | contact form |
//! | GET | `/health` | liveness |
//!
//!
//!
//! # Setup
//!
//! Run against a local Redis.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 RUST_LOG=info cargo run
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{CONTENT_TYPE, COOKIE},
    },
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod config;
pub mod contact;
pub mod database;
pub mod error;
pub mod likes;
pub mod model;
pub mod notify;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod utils;
pub mod visits;

use config::Config;
use routes::{
    contact_handler, get_count_handler, get_likes_handler, health_handler,
    increment_count_handler, session_handler, toggle_like_handler,
};
use state::AppState;

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;
    info!("Environment: {}", config.environment);

    info!("Initializing state...");
    let state = AppState::new(&config).await?;

    info!("Starting server...");
    let app = router(state, &config.allowed_origin)?;

    let address = format!("0.0.0.0:{}", config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("Failed to bind {address}"))?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

pub fn router(state: Arc<AppState>, allowed_origin: &str) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(allowed_origin)
        .with_context(|| format!("Invalid ALLOWED_ORIGIN {allowed_origin}"))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, COOKIE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(60 * 60));

    Ok(Router::new()
        .route("/api/getCount", get(get_count_handler))
        .route("/api/incrementCount", post(increment_count_handler))
        .route("/api/getLikes", get(get_likes_handler))
        .route("/api/toggleLike", post(toggle_like_handler))
        .route("/api/session", get(session_handler))
        .route("/api/contact", post(contact_handler))
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header::SET_COOKIE},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        contact::ContactService,
        model::Counter,
        notify::Notifier,
        state::Collaborators,
        store::memory::{MemoryCounters, MemorySessions},
        utils::testing::{FixedClock, SequentialIds},
    };

    struct Harness {
        app: Router,
        counters: Arc<MemoryCounters>,
        sessions: Arc<MemorySessions>,
    }

    fn harness(visitors: i64, likes: i64) -> Harness {
        let clock = Arc::new(FixedClock::new());
        let counters = Arc::new(MemoryCounters::with(&[
            (Counter::Visitors, visitors),
            (Counter::Likes, likes),
        ]));
        let sessions = Arc::new(MemorySessions::new(clock.clone()));

        let state = AppState::assemble(Collaborators {
            counters: counters.clone(),
            sessions: sessions.clone(),
            clock,
            ids: Arc::new(SequentialIds::new()),
            contact: ContactService::new(None),
            notifier: Notifier::new(Default::default()),
            session_ttl: chrono::Duration::hours(24),
        });

        Harness {
            app: router(state, "http://localhost:5173").unwrap(),
            counters,
            sessions,
        }
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
    ) -> (StatusCode, Option<String>, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(id) = cookie {
            request = request.header(COOKIE, format!("session_id={id}"));
        }

        let response = app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let session_id = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("session_id="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        let json = serde_json::from_slice(&body).unwrap_or(Value::Null);

        (status, session_id, json)
    }

    #[tokio::test]
    async fn test_get_counts() {
        let h = harness(42, 7);

        let (status, _, body) = send(&h.app, Method::GET, "/api/getCount", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 42);
        assert_eq!(body["success"], true);

        let (_, _, body) = send(&h.app, Method::GET, "/api/getLikes", None).await;
        assert_eq!(body["count"], 7);
    }

    #[tokio::test]
    async fn test_increment_once_per_session() {
        let h = harness(10, 0);

        let (status, cookie, body) = send(&h.app, Method::POST, "/api/incrementCount", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 11);
        assert_eq!(body["message"], "incremented");
        let id = cookie.unwrap();

        let (_, again, body) =
            send(&h.app, Method::POST, "/api/incrementCount", Some(&id)).await;
        assert_eq!(body["count"], 11);
        assert_eq!(body["message"], "already_visited");
        assert_eq!(again.as_deref(), Some(id.as_str()));
        assert_eq!(h.counters.value(Counter::Visitors), Some(11));
    }

    #[tokio::test]
    async fn test_malformed_cookie_gets_new_session() {
        let h = harness(0, 0);

        let (status, cookie, _) =
            send(&h.app, Method::GET, "/api/session", Some("not-a-session")).await;

        assert_eq!(status, StatusCode::OK);
        assert_ne!(cookie.as_deref(), Some("not-a-session"));
        assert_eq!(h.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_like_requires_session() {
        let h = harness(0, 5);

        let (status, _, body) = send(&h.app, Method::POST, "/api/toggleLike", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let unknown = "ab".repeat(32);
        let (status, _, _) = send(&h.app, Method::POST, "/api/toggleLike", Some(&unknown)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(h.counters.value(Counter::Likes), Some(5));
        assert_eq!(h.sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_toggle_like_round_trip() {
        let h = harness(0, 5);
        let (_, cookie, body) = send(&h.app, Method::GET, "/api/session", None).await;
        assert_eq!(body["data"]["new_session"], true);
        let id = cookie.unwrap();
        assert_eq!(body["data"]["session_id"], id.as_str());

        let (status, _, body) = send(&h.app, Method::POST, "/api/toggleLike", Some(&id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 6);
        assert_eq!(body["message"], "liked");
        assert_eq!(body["data"]["liked"], true);
        assert!(h.sessions.row(&id).unwrap().has_liked);

        let (_, _, body) = send(&h.app, Method::POST, "/api/toggleLike", Some(&id)).await;
        assert_eq!(body["count"], 5);
        assert_eq!(body["message"], "unliked");
        assert_eq!(body["data"]["liked"], false);

        let (_, _, body) = send(&h.app, Method::GET, "/api/session", Some(&id)).await;
        assert_eq!(body["data"]["new_session"], false);
        assert_eq!(body["data"]["has_liked"], false);
    }

    #[tokio::test]
    async fn test_failed_session_write_leaves_likes() {
        let h = harness(0, 1);
        let (_, cookie, _) = send(&h.app, Method::GET, "/api/session", None).await;
        let id = cookie.unwrap();
        h.sessions.fail_updates.store(true, Ordering::SeqCst);

        let (status, _, body) = send(&h.app, Method::POST, "/api/toggleLike", Some(&id)).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database error");
        assert_eq!(h.counters.value(Counter::Likes), Some(1));
        assert!(!h.sessions.row(&id).unwrap().has_liked);
    }

    #[tokio::test]
    async fn test_session_lost_before_visit_gets_fresh_session() {
        let h = harness(10, 0);
        let (_, cookie, _) = send(&h.app, Method::GET, "/api/session", None).await;
        let id = cookie.unwrap();
        h.sessions.drop_before_update.store(true, Ordering::SeqCst);

        let (status, fresh, body) =
            send(&h.app, Method::POST, "/api/incrementCount", Some(&id)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 11);
        assert_eq!(body["message"], "incremented");
        let fresh = fresh.unwrap();
        assert_ne!(fresh, id);
        assert!(h.sessions.row(&id).is_none());
        assert!(h.sessions.row(&fresh).unwrap().has_visited);
    }

    #[tokio::test]
    async fn test_store_failure_is_generic_500() {
        let h = harness(3, 0);
        h.counters.fail.store(true, Ordering::SeqCst);

        let (status, _, body) = send(&h.app, Method::GET, "/api/getCount", None).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Database error");
    }

    #[tokio::test]
    async fn test_contact_rejects_bad_body() {
        let h = harness(0, 0);

        let response = h
            .app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/contact")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"name": "Ada"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(0, 0);

        let response = h
            .app
            .clone()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }
}
