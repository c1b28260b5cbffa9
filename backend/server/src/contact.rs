//! # Contact
//!
//! Contact form intake.
//!
//! - Shape checks first, anything off is a [`AppError::MalformedPayload`]
//! - Then reCAPTCHA v3, the token must score at least [`MIN_SCORE`] for the `contact` action
//! - No secret configured means nothing verifies
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::error::AppError;

pub const VERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";
pub const MIN_SCORE: f64 = 0.5;
pub const EXPECTED_ACTION: &str = "contact";
pub const MAX_MESSAGE_CHARS: usize = 5000;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap());

#[derive(Deserialize, Debug, Clone)]
pub struct ContactRequest {
    pub name: String,
    pub email: String,
    pub message: String,
    pub recaptcha: String,
}

/// A request that passed verification.
#[derive(Debug, Clone)]
pub struct ContactMessage {
    pub id: String,
    pub name: String,
    pub email: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Deserialize, Debug, Default)]
pub struct RecaptchaResponse {
    pub success: bool,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub action: String,
}

impl RecaptchaResponse {
    pub fn accepted(&self) -> bool {
        self.success && self.score >= MIN_SCORE && self.action == EXPECTED_ACTION
    }
}

pub fn validate(request: &ContactRequest) -> Result<(), AppError> {
    let required = [
        &request.name,
        &request.email,
        &request.message,
        &request.recaptcha,
    ];

    if required.iter().any(|field| field.trim().is_empty())
        || !EMAIL.is_match(request.email.trim())
        || request.message.chars().count() > MAX_MESSAGE_CHARS
    {
        return Err(AppError::MalformedPayload);
    }

    Ok(())
}

pub struct ContactService {
    client: Client,
    secret: Option<String>,
}

impl ContactService {
    pub fn new(secret: Option<String>) -> Self {
        Self {
            client: Client::new(),
            secret,
        }
    }

    pub async fn process(
        &self,
        request: ContactRequest,
        id: String,
        now: DateTime<Utc>,
    ) -> Result<ContactMessage, AppError> {
        validate(&request)?;

        if !self.verify(&request.recaptcha).await? {
            return Err(AppError::VerificationFailed);
        }

        Ok(ContactMessage {
            id,
            name: request.name.trim().to_string(),
            email: request.email.trim().to_string(),
            message: request.message,
            timestamp: now,
        })
    }

    async fn verify(&self, token: &str) -> Result<bool, AppError> {
        let Some(secret) = self.secret.as_deref() else {
            warn!("RECAPTCHA_SECRET_KEY not configured, rejecting contact request");
            return Ok(false);
        };

        let response: RecaptchaResponse = self
            .client
            .post(VERIFY_URL)
            .form(&[("secret", secret), ("response", token)])
            .send()
            .await
            .map_err(|e| AppError::InternalError(e.into()))?
            .json()
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        Ok(response.accepted())
    }
}
