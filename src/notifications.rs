//! Admin notification content
//!
//! A [`NotificationJob`] owns a snapshot of the record it reports on, so the
//! HTTP handler can hand it off and forget about it. Rendering happens on the
//! notifier's worker, not in the request.

use chrono::{DateTime, Utc};

use crate::concierge::ConciergeRequest;
use crate::email::{EmailTag, OutboundEmail};
use crate::leads::SupportLead;

/// Where admin notifications come from and go to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryChannel {
    pub from: String,
    pub recipients: Vec<String>,
    /// Prefix for subjects, e.g. `[STAGING] `
    pub subject_prefix: String,
}

impl DeliveryChannel {
    pub fn new(from_email: &str, recipients: Vec<String>) -> Self {
        Self {
            from: format!("Advisory Leads <{}>", from_email),
            recipients,
            subject_prefix: String::new(),
        }
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }
}

/// Subject prefix for non-production environments
pub fn environment_subject_prefix(app_env: &str) -> &'static str {
    match app_env {
        "staging" => "[STAGING] ",
        "development" | "dev" => "[DEV] ",
        _ => "",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadSnapshot {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub time_zone: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl From<&SupportLead> for LeadSnapshot {
    fn from(lead: &SupportLead) -> Self {
        Self {
            id: lead.id,
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            time_zone: lead.time_zone.clone(),
            source: lead.source.clone(),
            created_at: lead.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConciergeSnapshot {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub location: String,
    pub services: Vec<String>,
    pub special_requirements: String,
    pub notes: String,
    pub additional_context: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ConciergeRequest> for ConciergeSnapshot {
    fn from(request: &ConciergeRequest) -> Self {
        Self {
            id: request.id,
            first_name: request.first_name.clone(),
            last_name: request.last_name.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            location: request.location.clone(),
            services: request.services(),
            special_requirements: request.special_requirements.clone(),
            notes: request.notes.clone(),
            additional_context: request.additional_context.clone(),
            created_at: request.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Lead(LeadSnapshot),
    Concierge(ConciergeSnapshot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationJob {
    pub kind: NotificationKind,
    pub channel: DeliveryChannel,
}

impl NotificationJob {
    pub fn lead(lead: &SupportLead, channel: DeliveryChannel) -> Self {
        Self {
            kind: NotificationKind::Lead(lead.into()),
            channel,
        }
    }

    pub fn concierge(request: &ConciergeRequest, channel: DeliveryChannel) -> Self {
        Self {
            kind: NotificationKind::Concierge(request.into()),
            channel,
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self.kind {
            NotificationKind::Lead(_) => "lead",
            NotificationKind::Concierge(_) => "concierge",
        }
    }

    pub fn record_id(&self) -> i64 {
        match &self.kind {
            NotificationKind::Lead(lead) => lead.id,
            NotificationKind::Concierge(request) => request.id,
        }
    }

    pub fn render(&self) -> OutboundEmail {
        let (subject, html, text, reply_to, tags) = match &self.kind {
            NotificationKind::Lead(lead) => (
                format!("New Lead: {} {}", lead.first_name, lead.last_name),
                lead_html(lead),
                lead_text(lead),
                lead.email.clone(),
                vec![
                    EmailTag::new("category", "lead-notification"),
                    EmailTag::new("source", tag_value(&lead.source)),
                ],
            ),
            NotificationKind::Concierge(request) => (
                format!(
                    "New Concierge Request: {} {}",
                    request.first_name, request.last_name
                ),
                concierge_html(request),
                concierge_text(request),
                request.email.clone(),
                vec![
                    EmailTag::new("category", "concierge-notification"),
                    EmailTag::new("services", request.services.len().to_string()),
                ],
            ),
        };

        OutboundEmail {
            from: self.channel.from.clone(),
            to: self.channel.recipients.clone(),
            subject: format!("{}{}", self.channel.subject_prefix, subject),
            html,
            text,
            reply_to: Some(reply_to),
            tags,
        }
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y, %H:%M UTC").to_string()
}

/// Tag values only allow ASCII letters, digits, `_` and `-`
fn tag_value(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const STYLE: &str = "body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #333; }
.container { max-width: 600px; margin: 0 auto; padding: 20px; }
.header { background: #1B1856; color: white; padding: 20px; border-radius: 8px 8px 0 0; }
.content { background: #f8f9fa; padding: 20px; border: 1px solid #dee2e6; border-top: none; border-radius: 0 0 8px 8px; }
.field { margin-bottom: 8px; }
.field-label { font-weight: 600; color: #495057; }
.button { display: inline-block; background: #1B1856; color: white; padding: 10px 20px; text-decoration: none; border-radius: 5px; }";

fn field(label: &str, value: &str) -> String {
    format!(
        r#"<div class="field"><span class="field-label">{}:</span> <span>{}</span></div>"#,
        label,
        escape_html(value)
    )
}

fn wrap_html(title: &str, subtitle: &str, fields: &[String], email: &str, footer: &str) -> String {
    let email = escape_html(email);
    format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><style>{style}</style></head>
<body>
<div class="container">
<div class="header"><h2 style="margin: 0;">{title}</h2><p style="margin: 5px 0 0;">{subtitle}</p></div>
<div class="content">
{fields}
<p style="text-align: center;"><a href="mailto:{email}" class="button">Reply</a></p>
<p style="text-align: center; font-size: 12px; color: #6c757d;">{footer}</p>
</div>
</div>
</body>
</html>"#,
        style = STYLE,
        title = title,
        subtitle = subtitle,
        fields = fields.join("\n"),
        email = email,
        footer = escape_html(footer),
    )
}

fn lead_html(lead: &LeadSnapshot) -> String {
    let name = format!("{} {}", lead.first_name, lead.last_name);
    let fields = vec![
        field("Name", &name),
        field("Email", &lead.email),
        field("Phone", &lead.phone),
        field("Time Zone", &lead.time_zone),
        field("Submitted", &format_timestamp(&lead.created_at)),
    ];
    wrap_html(
        "New Lead Alert",
        "Begin Journey Submission",
        &fields,
        &lead.email,
        &format!("Lead ID: {}", lead.id),
    )
}

fn lead_text(lead: &LeadSnapshot) -> String {
    format!(
        "NEW LEAD ALERT

Name: {} {}
Email: {}
Phone: {}
Time Zone: {}
Submitted: {}
Source: {}

Lead ID: {}

Reply to: {}
",
        lead.first_name,
        lead.last_name,
        lead.email,
        lead.phone,
        lead.time_zone,
        format_timestamp(&lead.created_at),
        lead.source,
        lead.id,
        lead.email
    )
}

fn optional_line(label: &str, value: &str) -> String {
    if value.trim().is_empty() {
        String::new()
    } else {
        format!("{}: {}\n", label, value)
    }
}

fn concierge_html(request: &ConciergeSnapshot) -> String {
    let name = format!("{} {}", request.first_name, request.last_name);
    let mut fields = vec![
        field("Name", &name),
        field("Email", &request.email),
        field("Phone", &request.phone),
        field("Location", &request.location),
        field("Services", &request.services.join(", ")),
    ];
    for (label, value) in [
        ("Special Requirements", &request.special_requirements),
        ("Notes", &request.notes),
        ("Additional Context", &request.additional_context),
    ] {
        if !value.trim().is_empty() {
            fields.push(field(label, value));
        }
    }
    fields.push(field("Submitted", &format_timestamp(&request.created_at)));

    wrap_html(
        "New Concierge Request",
        "Concierge Pricing Submission",
        &fields,
        &request.email,
        &format!("Submission ID: {}", request.id),
    )
}

fn concierge_text(request: &ConciergeSnapshot) -> String {
    let services: String = request
        .services
        .iter()
        .map(|s| format!("  - {}\n", s))
        .collect();

    format!(
        "NEW CONCIERGE REQUEST

Name: {} {}
Email: {}
Phone: {}
Location: {}

Selected Services ({}):
{}
{}{}{}Submitted: {}

Submission ID: {}
",
        request.first_name,
        request.last_name,
        request.email,
        request.phone,
        request.location,
        request.services.len(),
        services,
        optional_line("Special Requirements", &request.special_requirements),
        optional_line("Notes", &request.notes),
        optional_line("Additional Context", &request.additional_context),
        format_timestamp(&request.created_at),
        request.id
    )
}
