use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems,
};
use thiserror::Error;
use tracing::{error, info};

pub const DEFAULT_SESSION_TTL: Duration = Duration::hours(1);

/// Configuration for Stripe checkout
#[derive(Clone)]
pub struct StripeConfig {
    pub client: Client,
    pub price_id: String,
    pub frontend_url: String,
    pub session_ttl: Duration,
}

impl StripeConfig {
    /// Initialize Stripe configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let secret_key =
            std::env::var("STRIPE_SECRET_KEY").context("STRIPE_SECRET_KEY must be set")?;
        let price_id = std::env::var("STRIPE_PRICE_ID").context("STRIPE_PRICE_ID must be set")?;
        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self::new(secret_key, price_id, frontend_url))
    }

    pub fn new(
        secret_key: impl Into<String>,
        price_id: impl Into<String>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(secret_key.into()),
            price_id: price_id.into(),
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    pub fn success_url(&self) -> String {
        format!(
            "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}",
            self.frontend_url
        )
    }

    pub fn cancel_url(&self) -> String {
        format!("{}/payment/cancel", self.frontend_url)
    }
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("client", &"[REDACTED]")
            .field("price_id", &self.price_id)
            .field("frontend_url", &self.frontend_url)
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub account_id: i64,
    pub customer_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionInfo {
    pub id: String,
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("payment provider rejected the request: {0}")]
    Api(String),
    #[error("payment provider returned no checkout url")]
    MissingUrl,
}

/// Creates hosted checkout sessions for a single configured price
#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSessionInfo, ProviderError>;
}

pub struct StripeCheckoutProvider {
    config: StripeConfig,
}

impl StripeCheckoutProvider {
    pub fn new(config: StripeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl CheckoutProvider for StripeCheckoutProvider {
    async fn create_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSessionInfo, ProviderError> {
        let success_url = self.config.success_url();
        let cancel_url = self.config.cancel_url();
        let account_id = request.account_id.to_string();
        let requested_expiry = Utc::now() + self.config.session_ttl;

        let mut checkout_params = CreateCheckoutSession::new();
        checkout_params.success_url = Some(&success_url);
        checkout_params.cancel_url = Some(&cancel_url);
        checkout_params.mode = Some(CheckoutSessionMode::Payment);
        checkout_params.customer_email = Some(&request.customer_email);
        checkout_params.client_reference_id = Some(&account_id);
        checkout_params.expires_at = Some(requested_expiry.timestamp());
        checkout_params.metadata = Some(HashMap::from([(
            "account_id".to_string(),
            account_id.clone(),
        )]));
        checkout_params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(self.config.price_id.clone()),
            quantity: Some(1),
            ..Default::default()
        }]);

        let session = CheckoutSession::create(&self.config.client, checkout_params)
            .await
            .map_err(|e| {
                error!(error = %e, account_id = request.account_id, "Failed to create checkout session");
                metrics::counter!("stripe.api.errors").increment(1);
                ProviderError::Api(e.to_string())
            })?;

        let url = session.url.clone().ok_or(ProviderError::MissingUrl)?;
        let expires_at = Utc
            .timestamp_opt(session.expires_at, 0)
            .single()
            .unwrap_or(requested_expiry);

        info!(
            account_id = request.account_id,
            session_id = %session.id,
            "Created checkout session"
        );

        Ok(CheckoutSessionInfo {
            id: session.id.to_string(),
            url,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_urls_use_frontend_base() {
        let config = StripeConfig::new("sk_test_x", "price_123", "https://advice.example.com/");
        assert_eq!(
            config.success_url(),
            "https://advice.example.com/payment/success?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(config.cancel_url(), "https://advice.example.com/payment/cancel");
    }

    #[test]
    fn test_debug_redacts_client() {
        let config = StripeConfig::new("sk_test_secret", "price_123", "http://localhost:3000");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk_test_secret"));
        assert!(rendered.contains("price_123"));
    }
}
