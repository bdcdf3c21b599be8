use axum::{
    Json,
    body::Bytes,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::stripe_client::CheckoutRequest;
use crate::stripe_webhooks::{SIGNATURE_HEADER, WebhookError, WebhookRejection, handle_webhook};
use crate::web::AppState;

use super::{ApiError, json_body, parse_id};

#[derive(Debug, Deserialize)]
pub struct CheckoutBody {
    pub account_id: Option<serde_json::Value>,
    /// Older clients send the account id under this name
    pub user_id: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct AccountQuery {
    pub account_id: Option<String>,
    pub user_id: Option<String>,
}

impl AccountQuery {
    fn account_id(&self) -> Result<i64, ApiError> {
        let raw = self
            .account_id
            .as_ref()
            .or(self.user_id.as_ref())
            .map(|v| serde_json::Value::String(v.clone()));
        parse_id("account_id", raw.as_ref())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub ok: bool,
    pub session_id: String,
    pub url: String,
    /// Unix seconds, as the provider reports it
    #[serde(rename = "expires_at")]
    pub expires_at: i64,
}

/// `POST /api/billing/checkout`
pub async fn create_checkout(
    State(state): State<AppState>,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let account_id = parse_id(
        "account_id",
        body.account_id.as_ref().or(body.user_id.as_ref()),
    )?;

    let account = state
        .accounts
        .get_by_id(account_id)
        .await?
        .ok_or(ApiError::AccountNotFound)?;
    if account.has_paid {
        return Err(ApiError::AlreadyPaid);
    }

    let provider = state.checkout.as_ref().ok_or_else(|| {
        ApiError::ProviderUnavailable("Payments are not configured".to_string())
    })?;

    let session = provider
        .create_session(&CheckoutRequest {
            account_id: account.id,
            customer_email: account.email.clone(),
        })
        .await
        .map_err(|e| {
            error!(error = %e, account_id, "Checkout session creation failed");
            ApiError::Provider("Could not start checkout, please try again".to_string())
        })?;

    Ok(Json(CheckoutResponse {
        ok: true,
        session_id: session.id,
        url: session.url,
        expires_at: session.expires_at.timestamp(),
    })
    .into_response())
}

/// `GET /api/billing/access`
pub async fn get_access(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Response, ApiError> {
    let account_id = query.account_id()?;
    let account = state
        .accounts
        .get_by_id(account_id)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    Ok(Json(json!({
        "ok": true,
        "paid": account.has_paid,
        "paid_at": account.paid_at.map(|at| at.to_rfc3339()),
        "session_id": account.stripe_latest_session_id,
    }))
    .into_response())
}

/// `GET /api/billing/status`
pub async fn get_payment_status(
    State(state): State<AppState>,
    Query(query): Query<AccountQuery>,
) -> Result<Response, ApiError> {
    let account_id = query.account_id()?;
    let account = state
        .accounts
        .get_by_id(account_id)
        .await?
        .ok_or(ApiError::AccountNotFound)?;

    Ok(Json(json!({
        "ok": true,
        "account": {
            "id": account.id,
            "email": account.email,
            "has_paid": account.has_paid,
            "paid_at": account.paid_at.map(|at| at.to_rfc3339()),
            "stripe_customer_id": account.stripe_customer_id,
            "stripe_session_id": account.stripe_latest_session_id,
            "stripe_payment_intent_id": account.stripe_latest_payment_intent_id,
            "created_at": account.created_at.to_rfc3339(),
        }
    }))
    .into_response())
}

fn rejection_code(rejection: &WebhookRejection) -> &'static str {
    match rejection {
        WebhookRejection::MissingSignature | WebhookRejection::InvalidSignature(_) => "AUTH_ERROR",
        WebhookRejection::InvalidPayload(_)
        | WebhookRejection::MissingAccountId
        | WebhookRejection::InvalidAccountId(_) => "VALIDATION_ERROR",
    }
}

/// `POST /api/billing/webhook`
///
/// The body is taken as raw bytes so the signature is checked over exactly
/// what the provider sent.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(verifier) = state.webhook_verifier.as_ref() else {
        error!("Webhook received but no webhook secret is configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "ok": false,
                "error": "SERVER_ERROR",
                "status": "rejected",
                "message": "Webhook secret is not configured",
            })),
        )
            .into_response();
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    match handle_webhook(verifier, state.accounts.as_ref(), signature, &body).await {
        Ok(outcome) => {
            info!(status = outcome.status(), "Webhook acknowledged");
            (
                StatusCode::OK,
                Json(json!({
                    "ok": true,
                    "status": outcome.status(),
                    "message": outcome.message(),
                })),
            )
                .into_response()
        }
        Err(WebhookError::Rejected(rejection)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "ok": false,
                "error": rejection_code(&rejection),
                "status": "rejected",
                "message": rejection.to_string(),
            })),
        )
            .into_response(),
        Err(WebhookError::Store(e)) => {
            error!(error = %e, "Failed to apply webhook event");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "ok": false,
                    "error": "SERVER_ERROR",
                    "status": "rejected",
                    "message": "Event could not be recorded",
                })),
            )
                .into_response()
        }
    }
}
