//! # Notifications
//!
//! Best-effort email and SMS pings for new likes and contact messages.
//!
//! - Delivered through HTTP relays (`EMAIL_WEBHOOK_URL`, `SMS_WEBHOOK_URL`), unset means skipped
//! - Dispatched on a spawned task once the request's own work is done, never awaited by the request
//! - No retries, failures only show up in the logs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::NotificationConfig;

pub const SOURCE: &str = "resume-website";
const SITE: &str = "https://www.pwnph0fun.com";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotificationKind {
    Like,
    Contact {
        name: String,
        email: String,
        message: String,
    },
}

#[derive(Clone, Debug)]
pub struct Notification {
    pub kind: NotificationKind,
    pub source: &'static str,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
struct EmailPayload<'a> {
    to: &'a str,
    from: &'a str,
    subject: &'a str,
    body: &'a str,
}

#[derive(Serialize)]
struct SmsPayload<'a> {
    to: &'a str,
    body: &'a str,
}

impl Notification {
    pub fn like(timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Like,
            source: SOURCE,
            timestamp,
        }
    }

    pub fn contact(name: &str, email: &str, message: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            kind: NotificationKind::Contact {
                name: name.to_string(),
                email: email.to_string(),
                message: message.to_string(),
            },
            source: SOURCE,
            timestamp,
        }
    }

    fn when(&self) -> String {
        self.timestamp
            .format("%B %-d, %Y at %-I:%M %p UTC")
            .to_string()
    }

    /// Subject and plain text body.
    pub fn email(&self) -> (String, String) {
        match &self.kind {
            NotificationKind::Like => (
                "New Like 👍 on Your Resume!".to_string(),
                format!(
                    "Someone liked your resume!\n\nTime: {}\nSource: {}\n\nVisit your resume: {SITE}\n",
                    self.when(),
                    self.source
                ),
            ),
            NotificationKind::Contact {
                name,
                email,
                message,
            } => (
                "New Contact Form Submission on Your Cloud Resume!".to_string(),
                format!(
                    "New contact form submission received:\n\nName: {name}\nEmail: {email}\nMessage: {message}\n\n\
                     Received at: {}\nSource: {}\n\nReply to this person directly at: {email}\n",
                    self.when(),
                    self.source
                ),
            ),
        }
    }

    pub fn sms(&self) -> String {
        match &self.kind {
            NotificationKind::Like => format!("New like on your resume at {}", self.when()),
            NotificationKind::Contact { name, email, .. } => {
                format!("New contact message from {name} <{email}>")
            }
        }
    }
}

pub struct Notifier {
    client: Client,
    config: NotificationConfig,
}

impl Notifier {
    pub fn new(config: NotificationConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Fire-and-forget: email always, SMS for contact messages.
    pub fn dispatch(self: &Arc<Self>, notification: Notification) {
        let notifier = self.clone();

        tokio::spawn(async move {
            if let Err(e) = notifier.send_email(&notification).await {
                warn!("Email notification failed: {e}");
            }

            if matches!(notification.kind, NotificationKind::Contact { .. }) {
                if let Err(e) = notifier.send_sms(&notification).await {
                    warn!("SMS notification failed: {e}");
                }
            }
        });
    }

    pub async fn send_email(&self, notification: &Notification) -> Result<(), reqwest::Error> {
        let Some(url) = self.config.email_webhook.as_deref() else {
            debug!("No email relay configured, skipping");
            return Ok(());
        };
        if self.config.dst_email.is_empty() || self.config.src_email.is_empty() {
            debug!("No email addresses configured, skipping");
            return Ok(());
        }

        let (subject, body) = notification.email();
        let payload = EmailPayload {
            to: &self.config.dst_email,
            from: &self.config.src_email,
            subject: &subject,
            body: &body,
        };

        self.client
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }

    pub async fn send_sms(&self, notification: &Notification) -> Result<(), reqwest::Error> {
        let Some(url) = self.config.sms_webhook.as_deref() else {
            debug!("No SMS relay configured, skipping");
            return Ok(());
        };
        if self.config.dst_phone.is_empty() {
            debug!("No phone number configured, skipping");
            return Ok(());
        }

        let body = notification.sms();
        let payload = SmsPayload {
            to: &self.config.dst_phone,
            body: &body,
        };

        self.client
            .post(url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}
