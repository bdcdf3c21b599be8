use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::info;

use crate::contact_messages::{
    ContactMessage, ContactMessageChanges, ContactStatus, NewContactMessage,
};
use crate::pagination::PageRequest;
use crate::validation::{FieldErrors, is_valid_email, normalize_email};
use crate::web::AppState;

use super::{ApiError, json_body, optional_text, required_text};

#[derive(Debug, Deserialize)]
pub struct MessageListQuery {
    pub status: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl MessageListQuery {
    /// Unknown status values are ignored rather than rejected
    fn status_filter(&self) -> Option<ContactStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }

    fn page_request(&self) -> PageRequest {
        PageRequest::new(self.page, self.per_page)
    }
}

fn message_json(message: &ContactMessage) -> Value {
    json!({
        "id": message.id,
        "full_name": message.full_name,
        "email": message.email,
        "subject": message.subject,
        "message": message.message,
        "status": message.status,
        "created_at": message.created_at.to_rfc3339(),
        "updated_at": message.updated_at.to_rfc3339(),
    })
}

fn not_found() -> ApiError {
    ApiError::NotFound("Message not found".to_string())
}

fn as_object(body: &Value) -> Result<&Map<String, Value>, ApiError> {
    body.as_object()
        .ok_or_else(|| ApiError::validation("Request body must be a JSON object"))
}

fn parse_status(value: &Value) -> Result<ContactStatus, ApiError> {
    value
        .as_str()
        .ok_or_else(|| ApiError::validation("status must be a string"))?
        .parse()
        .map_err(ApiError::validation)
}

fn validate_new_message(body: &Value) -> Result<NewContactMessage, ApiError> {
    let data = as_object(body)?;

    let mut errors = FieldErrors::new();
    let full_name = required_text(&mut errors, "full_name", data.get("full_name"));
    let email = required_text(&mut errors, "email", data.get("email"));
    let message = required_text(&mut errors, "message", data.get("message"));

    if let Some(email) = &email
        && !is_valid_email(email)
    {
        errors.add("email", "Invalid email format");
    }

    let (Some(full_name), Some(email), Some(message)) = (full_name, email, message) else {
        return Err(ApiError::invalid_fields(errors));
    };
    if !errors.is_empty() {
        return Err(ApiError::invalid_fields(errors));
    }

    Ok(NewContactMessage {
        full_name,
        email: normalize_email(&email),
        subject: optional_text(data.get("subject")),
        message,
    })
}

/// Only keys present in the body become assignments
fn parse_changes(body: &Value) -> Result<ContactMessageChanges, ApiError> {
    let data = as_object(body)?;

    let mut errors = FieldErrors::new();
    let mut text = |field: &str| match data.get(field) {
        None => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(_) => {
            errors.add(field, format!("{} must be a string", field));
            None
        }
    };

    let full_name = text("full_name");
    let email = text("email");
    let subject = text("subject");
    let message = text("message");

    if let Some(email) = &email
        && !is_valid_email(email)
    {
        errors.add("email", "Invalid email format");
    }
    if !errors.is_empty() {
        return Err(ApiError::invalid_fields(errors));
    }

    let status = data.get("status").map(parse_status).transpose()?;

    Ok(ContactMessageChanges {
        full_name,
        email: email.map(|e| normalize_email(&e)),
        subject,
        message,
        status,
    })
}

/// `GET /api/contact/messages`
pub async fn list_contact_messages(
    State(state): State<AppState>,
    Query(query): Query<MessageListQuery>,
) -> Result<Response, ApiError> {
    let page = query.page_request();

    let (messages, total) = state
        .contact_messages
        .list(query.status_filter(), page)
        .await?;

    Ok(Json(json!({
        "ok": true,
        "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
        "total": total,
        "pages": page.page_count(total),
        "current_page": page.page,
        "per_page": page.per_page,
    }))
    .into_response())
}

/// `GET /api/contact/messages/{id}`
pub async fn get_contact_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let message = state
        .contact_messages
        .get_by_id(id)
        .await?
        .ok_or_else(not_found)?;

    Ok(Json(json!({ "ok": true, "message": message_json(&message) })).into_response())
}

/// `POST /api/contact/messages`
pub async fn create_contact_message(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let new_message = validate_new_message(&body)?;

    let id = state.contact_messages.create(new_message).await?;
    metrics::counter!("intake.contact_created_total").increment(1);
    info!(message_id = id, "Captured contact message");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "id": id,
            "message": "Contact message submitted successfully",
        })),
    )
        .into_response())
}

/// `PUT /api/contact/messages/{id}`
pub async fn update_contact_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    if state.contact_messages.get_by_id(id).await?.is_none() {
        return Err(not_found());
    }

    let body = json_body(body)?;
    let changes = parse_changes(&body)?;

    if !state.contact_messages.update(id, changes).await? {
        return Err(not_found());
    }

    Ok(Json(json!({
        "ok": true,
        "message": "Contact message updated successfully",
    }))
    .into_response())
}

/// `PUT /api/contact/messages/{id}/status`
pub async fn update_contact_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    if state.contact_messages.get_by_id(id).await?.is_none() {
        return Err(not_found());
    }

    let body = json_body(body)?;
    let status = as_object(&body)?
        .get("status")
        .ok_or_else(|| ApiError::validation("Missing status field"))
        .and_then(parse_status)?;

    if !state.contact_messages.update_status(id, status).await? {
        return Err(not_found());
    }

    Ok(Json(json!({
        "ok": true,
        "message": format!("Message status updated to '{}' successfully", status),
    }))
    .into_response())
}

/// `DELETE /api/contact/messages/{id}`
pub async fn delete_contact_message(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    if !state.contact_messages.delete(id).await? {
        return Err(not_found());
    }

    info!(message_id = id, "Deleted contact message");
    Ok(Json(json!({
        "ok": true,
        "message": "Contact message deleted successfully",
    }))
    .into_response())
}

/// `GET /api/contact/stats`
pub async fn contact_stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let stats = state.contact_messages.stats().await?;

    Ok(Json(json!({
        "ok": true,
        "total_messages": stats.total_messages,
        "new_messages": stats.new_messages,
        "read_messages": stats.read_messages,
        "replied_messages": stats.replied_messages,
    }))
    .into_response())
}
