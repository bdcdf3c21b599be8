use std::time::Duration;

use anyhow::{Context, Result};

use crate::email::parse_recipients;
use crate::notifications::{DeliveryChannel, environment_subject_prefix};
use crate::notifier::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS, NotifierConfig};
use crate::stripe_client::StripeConfig;
use crate::stripe_webhooks::DEFAULT_TOLERANCE;

pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_POOL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_FROM_EMAIL: &str = "notifications@example.com";
pub const NOTIFIER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Process configuration read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_env: String,
    pub database_url: String,
    pub pool_size: u32,
    pub pool_timeout: Duration,
    /// Present only when both the secret key and price id are set
    pub stripe: Option<StripeConfig>,
    pub webhook_secret: Option<String>,
    /// Maximum age of a signed webhook timestamp
    pub webhook_tolerance: Duration,
    pub notifier: NotifierConfig,
    /// Empty means any origin
    pub cors_allowed_origins: Vec<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got {:?}", name, raw)),
        None => Ok(default),
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let app_env = env_var("APP_ENV").unwrap_or_else(|| "development".to_string());
        let database_url = env_var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let pool_size = parse_env("DATABASE_POOL_SIZE", DEFAULT_POOL_SIZE)?;
        let pool_timeout_secs =
            parse_env("DATABASE_POOL_TIMEOUT_SECS", DEFAULT_POOL_TIMEOUT.as_secs())?;

        let stripe = if env_var("STRIPE_SECRET_KEY").is_some() && env_var("STRIPE_PRICE_ID").is_some()
        {
            Some(StripeConfig::from_env().context("Invalid Stripe configuration")?)
        } else {
            None
        };

        let webhook_tolerance_secs =
            parse_env("STRIPE_WEBHOOK_TOLERANCE_SECS", DEFAULT_TOLERANCE.as_secs())?;

        let from_email = env_var("RESEND_FROM_EMAIL")
            .or_else(|| env_var("FROM_EMAIL"))
            .unwrap_or_else(|| DEFAULT_FROM_EMAIL.to_string());
        let recipients =
            parse_recipients(&env_var("ADMIN_NOTIFICATION_EMAILS").unwrap_or_default());
        let channel = DeliveryChannel::new(&from_email, recipients)
            .with_subject_prefix(environment_subject_prefix(&app_env));

        let notifier = NotifierConfig {
            workers: parse_env("NOTIFIER_WORKERS", DEFAULT_WORKERS)?,
            queue_capacity: parse_env("NOTIFIER_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            channel,
        };

        let cors_allowed_origins = env_var("CORS_ALLOWED_ORIGINS")
            .map(|raw| parse_recipients(&raw))
            .unwrap_or_default();

        Ok(Self {
            app_env,
            database_url,
            pool_size,
            pool_timeout: Duration::from_secs(pool_timeout_secs),
            stripe,
            webhook_secret: env_var("STRIPE_WEBHOOK_SECRET"),
            webhook_tolerance: Duration::from_secs(webhook_tolerance_secs),
            notifier,
            cors_allowed_origins,
        })
    }
}
