use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::concierge::{ConciergeRequest, NewConciergeRequest};
use crate::validation::{
    FieldErrors, MIN_PHONE_DIGITS, is_valid_email, normalize_email, phone_digit_count,
};
use crate::web::AppState;

use super::{ApiError, ClientInfo, ListQuery, clamp_limit, json_body, optional_text};

pub const CONCIERGE_CREATED_MESSAGE: &str = "Thank you for your concierge request! We'll review your selection and get back to you with a detailed quote.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConciergeView {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub selected_services: Vec<String>,
    pub special_requirements: String,
    pub notes: String,
    pub additional_context: String,
    pub source: String,
    pub status: String,
    pub service_count: usize,
    pub created_at: String,
}

impl From<ConciergeRequest> for ConciergeView {
    fn from(request: ConciergeRequest) -> Self {
        let selected_services = request.services();
        Self {
            id: request.id,
            first_name: request.first_name,
            last_name: request.last_name,
            email: request.email,
            phone: request.phone,
            location: request.location,
            service_count: selected_services.len(),
            selected_services,
            special_requirements: request.special_requirements,
            notes: request.notes,
            additional_context: request.additional_context,
            source: request.source,
            status: request.status,
            created_at: request.created_at.to_rfc3339(),
        }
    }
}

fn contact_field(
    errors: &mut FieldErrors,
    contact: Option<&serde_json::Map<String, Value>>,
    field: &str,
) -> Option<String> {
    let value = contact
        .and_then(|c| c.get(field))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if value.is_none() {
        errors.add(&format!("contact.{}", field), format!("{} is required", field));
    }
    value.map(str::to_string)
}

fn validate_concierge(
    body: &Value,
    client: ClientInfo,
) -> Result<NewConciergeRequest, ApiError> {
    let Some(data) = body.as_object() else {
        return Err(ApiError::validation("Request body must be a JSON object"));
    };

    let mut errors = FieldErrors::new();
    let contact = data.get("contact").and_then(Value::as_object);

    let first_name = contact_field(&mut errors, contact, "firstName");
    let last_name = contact_field(&mut errors, contact, "lastName");
    let email = contact_field(&mut errors, contact, "email");
    let phone = contact_field(&mut errors, contact, "phone");

    if let Some(email) = &email
        && !is_valid_email(email)
    {
        errors.add("contact.email", "Invalid email format");
    }
    if let Some(phone) = &phone
        && phone_digit_count(phone) < MIN_PHONE_DIGITS
    {
        errors.add("contact.phone", "Invalid phone number");
    }

    let services: Vec<String> = data
        .get("selectedServices")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    if services.is_empty() {
        errors.add("selectedServices", "At least one service must be selected");
    }

    let (Some(first_name), Some(last_name), Some(email), Some(phone)) =
        (first_name, last_name, email, phone)
    else {
        return Err(ApiError::invalid_fields(errors));
    };
    if !errors.is_empty() {
        return Err(ApiError::invalid_fields(errors));
    }

    Ok(NewConciergeRequest {
        first_name,
        last_name,
        email: normalize_email(&email),
        phone,
        location: optional_text(contact.and_then(|c| c.get("location"))),
        selected_services: services,
        special_requirements: optional_text(data.get("specialRequirements")),
        notes: optional_text(data.get("notes")),
        additional_context: optional_text(data.get("additionalContext")),
        ip_address: client.ip_address,
        user_agent: client.user_agent,
    })
}

/// `POST /api/concierge`
pub async fn create_concierge_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let new_request = validate_concierge(&body, ClientInfo::from_headers(&headers))?;

    let request = state.concierge.create(new_request).await?;

    metrics::counter!("intake.concierge_created_total").increment(1);
    let notification = state.notifier.notify_concierge(&request);
    info!(
        submission_id = request.id,
        services = request.services().len(),
        ?notification,
        "Captured concierge request"
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "submissionId": request.id,
            "message": CONCIERGE_CREATED_MESSAGE,
        })),
    )
        .into_response())
}

/// `GET /api/concierge`
pub async fn list_concierge_requests(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let limit = clamp_limit(query.limit, 100, 500);
    let requests: Vec<ConciergeView> = state
        .concierge
        .list(limit)
        .await?
        .into_iter()
        .map(ConciergeView::from)
        .collect();

    Ok(Json(json!({
        "ok": true,
        "count": requests.len(),
        "requests": requests,
    }))
    .into_response())
}

/// `GET /api/concierge/{id}`
pub async fn get_concierge_request(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let request = state
        .concierge
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Request not found".to_string()))?;

    Ok(Json(json!({ "ok": true, "request": ConciergeView::from(request) })).into_response())
}
