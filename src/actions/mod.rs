pub mod billing;
pub mod concierge;
pub mod contact;
pub mod leads;
pub mod newsletter;
pub mod status;

pub use billing::*;
pub use concierge::*;
pub use contact::*;
pub use leads::*;
pub use newsletter::*;
pub use status::*;

use std::collections::BTreeMap;

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::gateway::GatewayError;
use crate::validation::FieldErrors;

/// Errors returned by handlers, rendered as `{ok: false, error, message, details}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<BTreeMap<String, String>>,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account has already paid")]
    AlreadyPaid,
    #[error("{0}")]
    Auth(String),
    #[error("{0}")]
    Provider(String),
    #[error("{0}")]
    ProviderUnavailable(String),
    #[error("Service temporarily unavailable")]
    Unavailable,
    #[error("Something went wrong")]
    Internal,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn invalid_fields(errors: FieldErrors) -> Self {
        ApiError::Validation {
            message: "Please fix the highlighted fields".to_string(),
            details: Some(errors.into_map()),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::AccountNotFound => "ACCOUNT_NOT_FOUND",
            ApiError::AlreadyPaid => "ALREADY_PAID",
            ApiError::Auth(_) => "AUTH_ERROR",
            ApiError::Provider(_) | ApiError::ProviderUnavailable(_) => "PROVIDER_ERROR",
            ApiError::Unavailable | ApiError::Internal => "SERVER_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::AlreadyPaid | ApiError::Auth(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) | ApiError::AccountNotFound => StatusCode::NOT_FOUND,
            ApiError::Provider(_) => StatusCode::BAD_GATEWAY,
            ApiError::ProviderUnavailable(_) | ApiError::Unavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    ok: bool,
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a BTreeMap<String, String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let details = match &self {
            ApiError::Validation { details, .. } => details.as_ref(),
            _ => None,
        };
        let body = ErrorBody {
            ok: false,
            error: self.code(),
            message: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        error!(error = %e, "Database operation failed");
        if e.is_unavailable() {
            ApiError::Unavailable
        } else {
            ApiError::Internal
        }
    }
}

/// Unwrap a JSON body, turning any rejection into a validation error
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|_| ApiError::validation("Request body must be valid JSON"))
}

/// Parse a positive numeric identifier from a query string or body value
pub fn parse_id(field: &str, raw: Option<&serde_json::Value>) -> Result<i64, ApiError> {
    let raw = raw
        .filter(|v| !v.is_null())
        .ok_or_else(|| ApiError::validation(format!("{} is required", field)))?;

    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::validation(format!("{} must be a positive integer", field)))
}

/// Requester details recorded alongside intake submissions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header_str = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let ip_address = header_str("x-forwarded-for")
            .and_then(|v| v.split(',').next().map(|ip| ip.trim().to_string()))
            .or_else(|| header_str("x-real-ip"));
        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        Self {
            ip_address,
            user_agent,
        }
    }
}

/// Required string field: records an error and returns `None` when the value
/// is missing, not a string, or blank
pub fn required_text(
    errors: &mut FieldErrors,
    field: &str,
    value: Option<&serde_json::Value>,
) -> Option<String> {
    match value {
        None | Some(serde_json::Value::Null) => {
            errors.add(field, format!("{} is required", field));
            None
        }
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
            errors.add(field, format!("{} cannot be empty", field));
            None
        }
        Some(serde_json::Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            errors.add(field, format!("{} must be a string", field));
            None
        }
    }
}

/// Optional string field; anything that is not a string reads as empty
pub fn optional_text(value: Option<&serde_json::Value>) -> String {
    value
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
}

/// Clamp a requested page size into `1..=max`
pub fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max)
}
