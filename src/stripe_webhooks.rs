//! Payment webhook intake
//!
//! A delivery is verified against the `Stripe-Signature` header before its
//! body is even parsed. Verified `checkout.session.completed` events with a
//! paid session move the referenced account from unpaid to paid exactly once;
//! every other event is acknowledged without touching stored state.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::{info, warn};

use crate::accounts::PaymentRecord;
use crate::accounts_repo::AccountStore;
use crate::gateway::GatewayError;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";
pub const DEFAULT_TOLERANCE: Duration = Duration::from_secs(300);

pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
pub const CHECKOUT_EXPIRED: &str = "checkout.session.expired";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature header is malformed")]
    Malformed,
    #[error("signature header has no timestamp")]
    MissingTimestamp,
    #[error("signature header has no v1 signature")]
    MissingSignature,
    #[error("timestamp outside the tolerance window")]
    TimestampOutsideTolerance,
    #[error("no signature matches the payload")]
    NoMatch,
}

/// Checks `t=<unix>,v1=<hex>` signatures over `"{t}.{payload}"`
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance: Duration,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), SignatureError> {
        self.verify_at(payload, header, Utc::now().timestamp())
    }

    pub fn verify_at(&self, payload: &[u8], header: &str, now: i64) -> Result<(), SignatureError> {
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<Vec<u8>> = Vec::new();

        for part in header.split(',') {
            let (key, value) = part.trim().split_once('=').ok_or(SignatureError::Malformed)?;
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| SignatureError::Malformed)?);
                }
                // Undecodable candidates simply never match
                "v1" => {
                    if let Ok(bytes) = hex::decode(value) {
                        signatures.push(bytes);
                    }
                }
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(SignatureError::MissingTimestamp)?;
        if signatures.is_empty() && !header.contains("v1=") {
            return Err(SignatureError::MissingSignature);
        }

        if now.abs_diff(timestamp) > self.tolerance.as_secs() {
            return Err(SignatureError::TimestampOutsideTolerance);
        }

        let mac = self.mac_for(timestamp, payload)?;
        if signatures
            .iter()
            .any(|candidate| mac.clone().verify_slice(candidate).is_ok())
        {
            Ok(())
        } else {
            Err(SignatureError::NoMatch)
        }
    }

    /// Header value the provider would send for this payload at `timestamp`
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, SignatureError> {
        let mac = self.mac_for(timestamp, payload)?;
        Ok(format!(
            "t={},v1={}",
            timestamp,
            hex::encode(mac.finalize().into_bytes())
        ))
    }

    fn mac_for(&self, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, SignatureError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac)
    }
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("secret", &"[REDACTED]")
            .field("tolerance", &self.tolerance)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// A provider id that may arrive either bare or as an expanded object
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ExpandableId {
    Id(String),
    Object { id: String },
}

impl ExpandableId {
    pub fn id(&self) -> &str {
        match self {
            ExpandableId::Id(id) => id,
            ExpandableId::Object { id } => id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    #[serde(default)]
    pub payment_status: Option<String>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub customer: Option<ExpandableId>,
    #[serde(default)]
    pub payment_intent: Option<ExpandableId>,
}

impl CheckoutSessionObject {
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    /// Account id from `metadata.account_id`, falling back to `metadata.user_id`
    pub fn account_id(&self) -> Result<i64, WebhookRejection> {
        let raw = self
            .metadata
            .as_ref()
            .and_then(|m| m.get("account_id").or_else(|| m.get("user_id")))
            .filter(|v| !v.is_null())
            .ok_or(WebhookRejection::MissingAccountId)?;

        let parsed = match raw {
            serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
            serde_json::Value::Number(n) => n.as_i64(),
            _ => None,
        };
        parsed.ok_or_else(|| WebhookRejection::InvalidAccountId(raw.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotPaid,
    SessionExpired,
    AccountNotFound(i64),
    UnhandledEvent(String),
}

impl IgnoreReason {
    fn label(&self) -> &'static str {
        match self {
            IgnoreReason::NotPaid => "not_paid",
            IgnoreReason::SessionExpired => "session_expired",
            IgnoreReason::AccountNotFound(_) => "account_not_found",
            IgnoreReason::UnhandledEvent(_) => "unhandled_event",
        }
    }
}

/// Result of a verified delivery; every variant is acknowledged with 200
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Processed { account_id: i64, session_id: String },
    AlreadyProcessed { account_id: i64, session_id: String },
    Ignored(IgnoreReason),
}

impl WebhookOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed { .. } => "processed",
            WebhookOutcome::AlreadyProcessed { .. } => "already_processed",
            WebhookOutcome::Ignored(_) => "ignored",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            WebhookOutcome::Processed { .. } => "Payment processed successfully",
            WebhookOutcome::AlreadyProcessed { .. } => "Already processed",
            WebhookOutcome::Ignored(IgnoreReason::NotPaid) => "Session not paid, ignoring",
            WebhookOutcome::Ignored(IgnoreReason::SessionExpired) => "Session expired noted",
            WebhookOutcome::Ignored(IgnoreReason::AccountNotFound(_)) => {
                "Account not found, ignoring"
            }
            WebhookOutcome::Ignored(IgnoreReason::UnhandledEvent(_)) => "Event received",
        }
    }
}

/// Deliveries refused with 400; the provider should not retry these
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookRejection {
    #[error("missing Stripe-Signature header")]
    MissingSignature,
    #[error("invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("checkout session has no account id in metadata")]
    MissingAccountId,
    #[error("checkout session account id is not numeric: {0}")]
    InvalidAccountId(String),
}

impl WebhookRejection {
    fn label(&self) -> &'static str {
        match self {
            WebhookRejection::MissingSignature => "missing_signature",
            WebhookRejection::InvalidSignature(_) => "invalid_signature",
            WebhookRejection::InvalidPayload(_) => "invalid_payload",
            WebhookRejection::MissingAccountId => "missing_account_id",
            WebhookRejection::InvalidAccountId(_) => "invalid_account_id",
        }
    }
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error(transparent)]
    Rejected(#[from] WebhookRejection),
    /// Verified event that could not be applied; answered with 500 so the provider retries
    #[error("account store failed: {0}")]
    Store(#[from] GatewayError),
}

pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, WebhookRejection> {
    serde_json::from_slice(payload).map_err(|e| WebhookRejection::InvalidPayload(e.to_string()))
}

/// Verify, parse and apply one delivery
pub async fn handle_webhook(
    verifier: &WebhookVerifier,
    accounts: &dyn AccountStore,
    signature: Option<&str>,
    payload: &[u8],
) -> Result<WebhookOutcome, WebhookError> {
    metrics::counter!("webhook.received_total").increment(1);

    let result = verify_and_apply(verifier, accounts, signature, payload).await;
    match &result {
        Ok(outcome) => match outcome {
            WebhookOutcome::Processed { .. } => {
                metrics::counter!("webhook.processed_total").increment(1);
            }
            WebhookOutcome::AlreadyProcessed { .. } => {
                metrics::counter!("webhook.already_processed_total").increment(1);
            }
            WebhookOutcome::Ignored(reason) => {
                metrics::counter!("webhook.ignored_total", "reason" => reason.label())
                    .increment(1);
            }
        },
        Err(WebhookError::Rejected(rejection)) => {
            warn!(reason = rejection.label(), "Rejected webhook delivery: {}", rejection);
            metrics::counter!("webhook.rejected_total", "reason" => rejection.label())
                .increment(1);
        }
        Err(WebhookError::Store(e)) => {
            warn!(error = %e, "Webhook could not be applied, provider will retry");
            metrics::counter!("webhook.store_failed_total").increment(1);
        }
    }
    result
}

async fn verify_and_apply(
    verifier: &WebhookVerifier,
    accounts: &dyn AccountStore,
    signature: Option<&str>,
    payload: &[u8],
) -> Result<WebhookOutcome, WebhookError> {
    let signature = signature
        .filter(|s| !s.trim().is_empty())
        .ok_or(WebhookRejection::MissingSignature)?;
    verifier
        .verify(payload, signature)
        .map_err(WebhookRejection::from)?;

    let event = parse_event(payload)?;
    apply_event(accounts, &event, Utc::now()).await
}

/// Apply a verified event to account state
pub async fn apply_event(
    accounts: &dyn AccountStore,
    event: &WebhookEvent,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, WebhookError> {
    match event.event_type.as_str() {
        CHECKOUT_COMPLETED => {
            let session: CheckoutSessionObject = serde_json::from_value(event.data.object.clone())
                .map_err(|e| WebhookRejection::InvalidPayload(e.to_string()))?;
            apply_completed_session(accounts, session, now).await
        }
        CHECKOUT_EXPIRED => {
            let session_id = event.data.object.get("id").and_then(|v| v.as_str());
            info!(session_id = ?session_id, "Checkout session expired");
            Ok(WebhookOutcome::Ignored(IgnoreReason::SessionExpired))
        }
        other => {
            info!(event_type = other, event_id = ?event.id, "Acknowledging unhandled webhook event");
            Ok(WebhookOutcome::Ignored(IgnoreReason::UnhandledEvent(
                other.to_string(),
            )))
        }
    }
}

async fn apply_completed_session(
    accounts: &dyn AccountStore,
    session: CheckoutSessionObject,
    now: DateTime<Utc>,
) -> Result<WebhookOutcome, WebhookError> {
    if !session.is_paid() {
        info!(session_id = %session.id, payment_status = ?session.payment_status, "Checkout completed without payment");
        return Ok(WebhookOutcome::Ignored(IgnoreReason::NotPaid));
    }

    let account_id = session.account_id()?;

    let Some(account) = accounts.get_by_id(account_id).await? else {
        warn!(account_id, session_id = %session.id, "Paid checkout references unknown account");
        return Ok(WebhookOutcome::Ignored(IgnoreReason::AccountNotFound(
            account_id,
        )));
    };

    if account.has_recorded_session(&session.id) {
        info!(account_id, session_id = %session.id, "Duplicate delivery of a processed checkout");
        return Ok(WebhookOutcome::AlreadyProcessed {
            account_id,
            session_id: session.id,
        });
    }

    let payment = PaymentRecord {
        session_id: session.id.clone(),
        customer_id: session.customer.as_ref().map(|c| c.id().to_string()),
        payment_intent_id: session.payment_intent.as_ref().map(|p| p.id().to_string()),
        paid_at: now,
    };

    if !accounts.mark_paid(account_id, &payment).await? {
        warn!(account_id, session_id = %session.id, "Account disappeared before payment could be recorded");
        return Ok(WebhookOutcome::Ignored(IgnoreReason::AccountNotFound(
            account_id,
        )));
    }

    info!(account_id, session_id = %session.id, "Recorded checkout payment");
    Ok(WebhookOutcome::Processed {
        account_id,
        session_id: session.id,
    })
}
