use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
    message::{Mailbox, Message, MultiPart},
    transport::smtp::{authentication::Credentials, client::TlsParametersBuilder},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";
const PROVIDER_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailTag {
    pub name: String,
    pub value: String,
}

impl EmailTag {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A fully rendered message ready for a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    /// Sender, either `addr@host` or `Display Name <addr@host>`
    pub from: String,
    pub to: Vec<String>,
    pub subject: String,
    pub html: String,
    pub text: String,
    pub reply_to: Option<String>,
    pub tags: Vec<EmailTag>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Provider message id, when the provider returns one
    pub id: Option<String>,
}

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("invalid address {0}")]
    InvalidAddress(String),
    #[error("failed to build message: {0}")]
    Build(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, EmailError>;
}

#[derive(Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    html: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    tags: &'a [EmailTag],
}

#[derive(Deserialize)]
struct ResendResponse {
    id: Option<String>,
}

/// Resend HTTP API
pub struct ResendProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl ResendProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self, EmailError> {
        Self::with_endpoint(api_key, RESEND_ENDPOINT)
    }

    pub fn with_endpoint(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Result<Self, EmailError> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, EmailError> {
        let body = ResendRequest {
            from: &email.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
            reply_to: email.reply_to.as_deref(),
            tags: &email.tags,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmailError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ResendResponse = response
            .json()
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;
        Ok(DeliveryReceipt { id: parsed.id })
    }
}

#[derive(Clone)]
pub struct SmtpSettings {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// SMTP relay through lettre
pub struct SmtpProvider {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpProvider {
    pub fn new(settings: SmtpSettings) -> Result<Self, EmailError> {
        let creds = Credentials::new(settings.username, settings.password);
        let server = settings.server;
        let port = settings.port;

        // 1025 is a local catcher without TLS, 465 is implicit TLS, anything else STARTTLS
        let mailer = if port == 1025 {
            info!("Using insecure SMTP connection for port 1025 without TLS");
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&server)
                .port(port)
                .tls(lettre::transport::smtp::client::Tls::None)
                .build()
        } else {
            let tls_params = TlsParametersBuilder::new(server.clone())
                .build()
                .map_err(|e| EmailError::Transport(format!("TLS parameters: {}", e)))?;
            let tls = if port == 465 {
                info!("Using implicit TLS (SMTPS) for port 465");
                lettre::transport::smtp::client::Tls::Wrapper(tls_params)
            } else {
                info!("Using STARTTLS for port {}", port);
                lettre::transport::smtp::client::Tls::Required(tls_params)
            };
            AsyncSmtpTransport::<Tokio1Executor>::relay(&server)
                .map_err(|e| EmailError::Transport(e.to_string()))?
                .port(port)
                .credentials(creds)
                .tls(tls)
                .timeout(Some(PROVIDER_TIMEOUT))
                .build()
        };

        Ok(Self { mailer })
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, EmailError> {
    address
        .parse::<Mailbox>()
        .map_err(|_| EmailError::InvalidAddress(address.to_string()))
}

/// Build the multipart/alternative message sent over SMTP
pub fn build_smtp_message(email: &OutboundEmail) -> Result<Message, EmailError> {
    let mut builder = Message::builder()
        .from(parse_mailbox(&email.from)?)
        .subject(email.subject.clone());

    for recipient in &email.to {
        builder = builder.to(parse_mailbox(recipient)?);
    }
    if let Some(reply_to) = &email.reply_to {
        builder = builder.reply_to(parse_mailbox(reply_to)?);
    }

    builder
        .multipart(MultiPart::alternative_plain_html(
            email.text.clone(),
            email.html.clone(),
        ))
        .map_err(|e| EmailError::Build(e.to_string()))
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn send(&self, email: &OutboundEmail) -> Result<DeliveryReceipt, EmailError> {
        let message = build_smtp_message(email)?;
        let response = self
            .mailer
            .send(message)
            .await
            .map_err(|e| EmailError::Transport(e.to_string()))?;

        Ok(DeliveryReceipt {
            id: response.first_line().map(str::to_string),
        })
    }
}

/// Split a comma separated recipient list, dropping blanks
pub fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// Pick the configured provider: Resend when an API key is set, SMTP when a
/// server is set, otherwise none.
pub fn provider_from_env() -> Result<Option<Arc<dyn EmailProvider>>> {
    if let Ok(api_key) = std::env::var("RESEND_API_KEY")
        && !api_key.trim().is_empty()
    {
        let provider = ResendProvider::new(api_key).context("Failed to build Resend client")?;
        return Ok(Some(Arc::new(provider)));
    }

    if let Ok(server) = std::env::var("SMTP_SERVER")
        && !server.trim().is_empty()
    {
        let port: u16 = std::env::var("SMTP_PORT")
            .unwrap_or_else(|_| "587".to_string())
            .parse()
            .context("SMTP_PORT must be a valid port")?;
        let settings = SmtpSettings {
            server,
            port,
            username: std::env::var("SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
        };
        let provider = SmtpProvider::new(settings).context("Failed to build SMTP transport")?;
        return Ok(Some(Arc::new(provider)));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email() -> OutboundEmail {
        OutboundEmail {
            from: "Advisory Leads <notifications@example.com>".to_string(),
            to: vec!["ops@example.com".to_string(), "cfo@example.com".to_string()],
            subject: "New Lead: Ada Lovelace".to_string(),
            html: "<p>hi</p>".to_string(),
            text: "hi".to_string(),
            reply_to: Some("ada@example.com".to_string()),
            tags: vec![EmailTag::new("category", "lead-notification")],
        }
    }

    #[test]
    fn test_parse_recipients() {
        assert_eq!(
            parse_recipients(" ops@example.com, ,cfo@example.com,"),
            vec!["ops@example.com", "cfo@example.com"]
        );
        assert!(parse_recipients("  ").is_empty());
    }

    #[test]
    fn test_smtp_message_carries_headers() {
        let message = build_smtp_message(&email()).unwrap();
        let headers = message.headers().to_string();
        assert!(headers.contains("Subject: New Lead: Ada Lovelace"));
        assert!(headers.contains("Reply-To: ada@example.com"));
        assert!(headers.contains("cfo@example.com"));
    }

    #[test]
    fn test_smtp_message_rejects_bad_address() {
        let mut bad = email();
        bad.to = vec!["not an address".to_string()];
        assert!(matches!(
            build_smtp_message(&bad),
            Err(EmailError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_resend_body_shape() {
        let email = email();
        let body = ResendRequest {
            from: &email.from,
            to: &email.to,
            subject: &email.subject,
            html: &email.html,
            text: &email.text,
            reply_to: None,
            tags: &email.tags,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["to"][1], "cfo@example.com");
        assert_eq!(value["tags"][0]["name"], "category");
        assert!(value.get("reply_to").is_none());
    }
}
