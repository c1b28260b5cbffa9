use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::{
    contact::ContactRequest,
    error::{AppError, CoreError},
    model::{Counter, LikeAction, Session},
    notify::Notification,
    state::AppState,
    utils::is_well_formed_session_id,
};

pub const SESSION_COOKIE: &str = "session_id";

#[derive(Serialize, Default, Debug)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ApiResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    pub fn count(count: i64) -> Self {
        Self {
            count: Some(count),
            ..Self::ok()
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Malformed cookie values count as no cookie.
fn raw_session_id(jar: &CookieJar) -> &str {
    jar.get(SESSION_COOKIE)
        .map(|cookie| cookie.value())
        .filter(|value| is_well_formed_session_id(value))
        .unwrap_or("")
}

fn session_cookie(state: &AppState, session: &Session) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.session_id.clone()))
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(state.session_ttl.num_seconds()))
        .path("/")
        .build()
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn get_count_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse>, AppError> {
    let count = state.counters.get_count(Counter::Visitors).await?;

    Ok(Json(ApiResponse::count(count)))
}

pub async fn get_likes_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse>, AppError> {
    let count = state.counters.get_count(Counter::Likes).await?;

    Ok(Json(ApiResponse::count(count)))
}

pub async fn increment_count_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse>), AppError> {
    let (mut session, mut is_new) = state.coordinator.resolve(raw_session_id(&jar)).await?;
    let outcome = state.visits.record_visit(&mut session).await;

    let (count, action) = match outcome {
        // the row expired between resolve and the claim, start over with a fresh session
        Err(CoreError::InvalidSession) => {
            debug!("Session {} vanished before its visit was claimed", session.session_id);
            (session, is_new) = state.coordinator.resolve("").await?;
            state.visits.record_visit(&mut session).await?
        }
        outcome => outcome?,
    };

    debug!(
        "Visit {} for session {} (new session: {is_new})",
        action.as_str(),
        session.session_id
    );

    let cookie = session_cookie(&state, &session);

    Ok((
        jar.add(cookie),
        Json(ApiResponse::count(count).with_message(action.as_str())),
    ))
}

pub async fn toggle_like_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse>), AppError> {
    let mut session = state.coordinator.require(raw_session_id(&jar)).await?;
    let (count, action) = state.likes.toggle_like(&mut session).await?;

    if action == LikeAction::Liked {
        state.notifier.dispatch(Notification::like(state.clock.now()));
    }

    let cookie = session_cookie(&state, &session);

    Ok((
        jar.add(cookie),
        Json(
            ApiResponse::count(count)
                .with_message(action.as_str())
                .with_data(json!({ "liked": session.has_liked })),
        ),
    ))
}

pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<ApiResponse>), AppError> {
    let (session, is_new) = state.coordinator.resolve(raw_session_id(&jar)).await?;
    let cookie = session_cookie(&state, &session);

    Ok((
        jar.add(cookie),
        Json(ApiResponse::ok().with_data(json!({
            "session_id": session.session_id,
            "has_visited": session.has_visited,
            "has_liked": session.has_liked,
            "new_session": is_new,
        }))),
    ))
}

pub async fn contact_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Json<ApiResponse>, AppError> {
    let Json(request) = payload.map_err(|_| AppError::MalformedPayload)?;

    let message = state
        .contact
        .process(request, state.ids.generate(), state.clock.now())
        .await?;

    info!("Contact message {} accepted", message.id);

    state.notifier.dispatch(Notification::contact(
        &message.name,
        &message.email,
        &message.message,
        message.timestamp,
    ));

    Ok(Json(ApiResponse::ok().with_message("Message sent successfully")))
}
