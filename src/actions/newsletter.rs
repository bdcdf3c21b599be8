use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::newsletter::{LeadSource, NewNewsletterLead, NewsletterLead};
use crate::pagination::PageRequest;
use crate::validation::{FieldErrors, is_valid_email, normalize_email};
use crate::web::AppState;

use super::{ApiError, json_body, required_text};

#[derive(Debug, Deserialize)]
pub struct NewsletterListQuery {
    pub source: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl NewsletterListQuery {
    /// Unknown sources list everything
    fn source_filter(&self) -> Option<LeadSource> {
        self.source.as_deref().and_then(|s| s.parse().ok())
    }
}

fn newsletter_json(lead: &NewsletterLead) -> Value {
    json!({
        "id": lead.id,
        "email": lead.email,
        "source": lead.source,
        "created_at": lead.created_at.to_rfc3339(),
    })
}

fn validate_signup(body: &Value) -> Result<NewNewsletterLead, ApiError> {
    let Some(data) = body.as_object() else {
        return Err(ApiError::validation("Request body must be a JSON object"));
    };

    let mut errors = FieldErrors::new();
    let email = required_text(&mut errors, "email", data.get("email"));
    if let Some(email) = &email
        && !is_valid_email(email)
    {
        errors.add("email", "Invalid email format");
    }

    let source = match data.get("source") {
        None | Some(Value::Null) => Some(LeadSource::default()),
        Some(Value::String(s)) => s.trim().parse::<LeadSource>().ok(),
        Some(_) => None,
    };
    if source.is_none() {
        errors.add("source", "Invalid source");
    }

    match (email, source) {
        (Some(email), Some(source)) if errors.is_empty() => Ok(NewNewsletterLead {
            email: normalize_email(&email),
            source,
        }),
        _ => Err(ApiError::invalid_fields(errors)),
    }
}

/// `POST /api/leads`
pub async fn create_newsletter_lead(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let signup = validate_signup(&body)?;
    let source = signup.source;

    let id = state.newsletter.create(signup).await?;
    metrics::counter!("intake.newsletter_created_total", "source" => source.as_str())
        .increment(1);
    info!(lead_id = id, %source, "Captured newsletter signup");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "id": id,
            "message": "Lead added successfully",
        })),
    )
        .into_response())
}

/// `GET /api/leads`
pub async fn list_newsletter_leads(
    State(state): State<AppState>,
    Query(query): Query<NewsletterListQuery>,
) -> Result<Response, ApiError> {
    let page = PageRequest::new(query.page, query.per_page);

    let (leads, total) = state.newsletter.list(query.source_filter(), page).await?;

    Ok(Json(json!({
        "ok": true,
        "leads": leads.iter().map(newsletter_json).collect::<Vec<_>>(),
        "total": total,
        "pages": page.page_count(total),
        "current_page": page.page,
        "per_page": page.per_page,
    }))
    .into_response())
}
