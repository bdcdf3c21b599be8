use axum::{
    Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::info;

use crate::leads::{NewSupportLead, SupportLead};
use crate::validation::{FieldErrors, is_valid_email, normalize_email};
use crate::web::AppState;

use super::{
    ApiError, ClientInfo, ListQuery, clamp_limit, json_body, optional_text, required_text,
};

pub const LEAD_CREATED_MESSAGE: &str = "Thanks — we'll reach out via email shortly.";

/// View model for support leads (API response)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadView {
    pub id: i64,
    pub account_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub time_zone: String,
    pub agree: bool,
    pub offer_id: Option<String>,
    pub price_label: Option<String>,
    pub source: String,
    pub status: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub internal_notes: Option<String>,
    pub created_at: String,
}

impl From<SupportLead> for LeadView {
    fn from(lead: SupportLead) -> Self {
        Self {
            id: lead.id,
            account_id: lead.account_id,
            first_name: lead.first_name,
            last_name: lead.last_name,
            email: lead.email,
            phone: lead.phone,
            time_zone: lead.time_zone,
            agree: lead.consent_to_contact,
            offer_id: lead.offer_id,
            price_label: lead.price_label,
            source: lead.source,
            status: lead.status,
            ip_address: lead.ip_address,
            user_agent: lead.user_agent,
            internal_notes: lead.internal_notes,
            created_at: lead.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug)]
struct BeginJourney {
    first_name: String,
    last_name: String,
    email: String,
    phone: String,
    time_zone: String,
    offer_id: Option<String>,
    price_label: Option<String>,
}

fn validate_begin_journey(body: &Value) -> Result<BeginJourney, ApiError> {
    let Some(data) = body.as_object() else {
        return Err(ApiError::validation("Request body must be a JSON object"));
    };

    let mut errors = FieldErrors::new();
    let first_name = required_text(&mut errors, "firstName", data.get("firstName"));
    let last_name = required_text(&mut errors, "lastName", data.get("lastName"));
    let email = required_text(&mut errors, "email", data.get("email"));
    let phone = required_text(&mut errors, "phone", data.get("phone"));
    let time_zone = required_text(&mut errors, "timeZone", data.get("timeZone"));

    if let Some(email) = &email
        && !is_valid_email(email)
    {
        errors.add("email", "Invalid email format");
    }

    match data.get("agree") {
        None | Some(Value::Null) => errors.add("agree", "agree is required"),
        Some(Value::Bool(true)) => {}
        Some(Value::Bool(false)) => errors.add("agree", "You must agree to continue"),
        Some(_) => errors.add("agree", "agree must be a boolean"),
    }

    let (Some(first_name), Some(last_name), Some(email), Some(phone), Some(time_zone)) =
        (first_name, last_name, email, phone, time_zone)
    else {
        return Err(ApiError::invalid_fields(errors));
    };
    if !errors.is_empty() {
        return Err(ApiError::invalid_fields(errors));
    }

    let optional = |field: &str| Some(optional_text(data.get(field))).filter(|v| !v.is_empty());

    Ok(BeginJourney {
        first_name,
        last_name,
        email: normalize_email(&email),
        phone,
        time_zone,
        offer_id: optional("offerId"),
        price_label: optional("priceLabel"),
    })
}

/// `POST /api/start`
pub async fn begin_journey(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let body = json_body(body)?;
    let submission = validate_begin_journey(&body)?;
    let client = ClientInfo::from_headers(&headers);

    let account = state
        .accounts
        .find_or_create_by_email(&submission.email)
        .await?;

    let lead = state
        .leads
        .create(NewSupportLead {
            account_id: account.id,
            first_name: submission.first_name,
            last_name: submission.last_name,
            email: submission.email,
            phone: submission.phone,
            time_zone: submission.time_zone,
            consent_to_contact: true,
            offer_id: submission.offer_id,
            price_label: submission.price_label,
            ip_address: client.ip_address,
            user_agent: client.user_agent,
        })
        .await?;

    metrics::counter!("intake.leads_created_total").increment(1);
    info!(lead_id = lead.id, account_id = account.id, "Captured begin-journey lead");

    let notification = state.notifier.notify_lead(&lead);
    info!(lead_id = lead.id, ?notification, "Lead notification handed off");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "ok": true,
            "leadId": lead.id,
            "accountId": account.id,
            "message": LEAD_CREATED_MESSAGE,
        })),
    )
        .into_response())
}

/// `GET /api/start`
pub async fn list_leads(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Response, ApiError> {
    let limit = clamp_limit(query.limit, 100, 500);
    let leads: Vec<LeadView> = state
        .leads
        .list(limit)
        .await?
        .into_iter()
        .map(LeadView::from)
        .collect();

    Ok(Json(json!({ "ok": true, "leads": leads })).into_response())
}

/// `GET /api/start/{id}`
pub async fn get_lead(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let lead = state
        .leads
        .get_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Lead not found".to_string()))?;

    Ok(Json(json!({ "ok": true, "lead": LeadView::from(lead) })).into_response())
}
