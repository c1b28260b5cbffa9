use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use anyhow::{Context, Result};
use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub counters_table: String,
    pub session_table: String,
    pub session_ttl: chrono::Duration,
    pub store_timeout: Duration,
    pub seed_counters: bool,
    pub allowed_origin: String,
    pub environment: String,
    pub recaptcha_secret: Option<String>,
    pub notifications: NotificationConfig,
}

#[derive(Clone, Default)]
pub struct NotificationConfig {
    pub dst_email: String,
    pub src_email: String,
    pub dst_phone: String,
    pub email_webhook: Option<String>,
    pub sms_webhook: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let session_ttl_hours: i64 = try_load("SESSION_TTL_HOURS", "24")?;
        let store_timeout_ms: u64 = try_load("STORE_TIMEOUT_MS", "500")?;

        Ok(Self {
            port: try_load("RUST_PORT", "8080")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            counters_table: try_load("COUNTERS_TABLE", "counters")?,
            session_table: try_load("SESSION_TABLE", "session")?,
            session_ttl: chrono::Duration::hours(session_ttl_hours),
            store_timeout: Duration::from_millis(store_timeout_ms),
            seed_counters: try_load("SEED_COUNTERS", "true")?,
            allowed_origin: try_load("ALLOWED_ORIGIN", "https://www.pwnph0fun.com")?,
            environment: try_load("ENVIRONMENT", "dev")?,
            recaptcha_secret: read_secret("RECAPTCHA_SECRET_KEY"),
            notifications: NotificationConfig {
                dst_email: try_load("NOTIFICATION_DST_EMAIL", "")?,
                src_email: try_load("NOTIFICATION_SRC_EMAIL", "")?,
                dst_phone: try_load("NOTIFICATION_DST_PHONE", "")?,
                email_webhook: var("EMAIL_WEBHOOK_URL").ok(),
                sms_webhook: var("SMS_WEBHOOK_URL").ok(),
            },
        })
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    parse_or_default(key, var(key).ok(), default)
}

fn parse_or_default<T: FromStr>(key: &str, value: Option<String>, default: &str) -> Result<T>
where
    T::Err: Display,
{
    value
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("Invalid {key} value"))
}

/// `/run/secrets/<name>` first, then the environment.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            warn!("Failed to read {secret_name} from file: {e}");
        })
        .or_else(|_| var(secret_name))
        .ok()
        .filter(|s| !s.is_empty())
}
