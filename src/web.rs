use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::accounts_repo::{AccountStore, AccountsRepository};
use crate::actions;
use crate::concierge_repo::{ConciergeRepository, ConciergeStore};
use crate::contact_messages_repo::{ContactMessageStore, ContactMessagesRepository};
use crate::gateway::Gateway;
use crate::leads_repo::{LeadStore, LeadsRepository};
use crate::metrics::metrics_handler;
use crate::newsletter_repo::{NewsletterLeadStore, NewsletterLeadsRepository};
use crate::notifier::NotifierHandle;
use crate::stripe_client::CheckoutProvider;
use crate::stripe_webhooks::WebhookVerifier;

/// Shared handler state; every field is cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub gateway: Gateway,
    pub accounts: Arc<dyn AccountStore>,
    pub leads: Arc<dyn LeadStore>,
    pub concierge: Arc<dyn ConciergeStore>,
    pub contact_messages: Arc<dyn ContactMessageStore>,
    pub newsletter: Arc<dyn NewsletterLeadStore>,
    /// `None` when payments are not configured
    pub checkout: Option<Arc<dyn CheckoutProvider>>,
    pub webhook_verifier: Option<WebhookVerifier>,
    pub notifier: NotifierHandle,
}

impl AppState {
    /// Database-backed stores, no payment provider, notifications disabled
    pub fn new(gateway: Gateway) -> Self {
        Self {
            accounts: Arc::new(AccountsRepository::new(gateway.clone())),
            leads: Arc::new(LeadsRepository::new(gateway.clone())),
            concierge: Arc::new(ConciergeRepository::new(gateway.clone())),
            contact_messages: Arc::new(ContactMessagesRepository::new(gateway.clone())),
            newsletter: Arc::new(NewsletterLeadsRepository::new(gateway.clone())),
            checkout: None,
            webhook_verifier: None,
            notifier: NotifierHandle::disabled(),
            gateway,
        }
    }

    pub fn with_accounts(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = accounts;
        self
    }

    pub fn with_leads(mut self, leads: Arc<dyn LeadStore>) -> Self {
        self.leads = leads;
        self
    }

    pub fn with_concierge(mut self, concierge: Arc<dyn ConciergeStore>) -> Self {
        self.concierge = concierge;
        self
    }

    pub fn with_contact_messages(
        mut self,
        contact_messages: Arc<dyn ContactMessageStore>,
    ) -> Self {
        self.contact_messages = contact_messages;
        self
    }

    pub fn with_newsletter(mut self, newsletter: Arc<dyn NewsletterLeadStore>) -> Self {
        self.newsletter = newsletter;
        self
    }

    pub fn with_checkout(mut self, checkout: Arc<dyn CheckoutProvider>) -> Self {
        self.checkout = Some(checkout);
        self
    }

    pub fn with_webhook_verifier(mut self, verifier: WebhookVerifier) -> Self {
        self.webhook_verifier = Some(verifier);
        self
    }

    pub fn with_notifier(mut self, notifier: NotifierHandle) -> Self {
        self.notifier = notifier;
        self
    }
}

// Middleware for request logging with correlation ID
async fn request_logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4().to_string()[..8].to_string();
    let start_time = Instant::now();

    info!("Started {} {} [{}]", method, path, request_id);

    let response = next.run(request).await;
    let duration = start_time.elapsed();
    let status = response.status();

    metrics::histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status.as_u16().to_string()
    )
    .record(duration.as_secs_f64());

    info!(
        "Completed {} {} [{}] {} in {:.2}ms",
        method,
        path,
        request_id,
        status.as_u16(),
        duration.as_secs_f64() * 1000.0
    );

    response
}

// Middleware to capture HTTP errors to Sentry
async fn sentry_error_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    if response.status().is_server_error() {
        let status = response.status();
        error!("HTTP {} error on {} {}", status.as_u16(), method, uri);

        sentry::configure_scope(|scope| {
            scope.set_tag("http.method", method.as_str());
            scope.set_tag("http.url", uri.to_string());
            scope.set_tag("http.status_code", status.as_u16().to_string());
        });

        sentry::capture_message(
            &format!("HTTP {} error on {} {}", status.as_u16(), method, uri),
            sentry::Level::Error,
        );
    }

    response
}

/// Permissive when no origins are configured, otherwise an explicit allow-list
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_TYPE])
}

pub fn build_router(state: AppState, cors: CorsLayer) -> Router {
    let api_router = Router::new()
        // Billing
        .route("/billing/checkout", post(actions::create_checkout))
        .route("/billing/access", get(actions::get_access))
        .route("/billing/status", get(actions::get_payment_status))
        .route("/billing/webhook", post(actions::stripe_webhook))
        // Begin journey leads
        .route("/start", post(actions::begin_journey).get(actions::list_leads))
        .route("/start/{id}", get(actions::get_lead))
        // Newsletter signups
        .route(
            "/leads",
            post(actions::create_newsletter_lead).get(actions::list_newsletter_leads),
        )
        // Concierge requests
        .route(
            "/concierge",
            post(actions::create_concierge_request).get(actions::list_concierge_requests),
        )
        .route("/concierge/{id}", get(actions::get_concierge_request))
        // Contact messages
        .route(
            "/contact/messages",
            get(actions::list_contact_messages).post(actions::create_contact_message),
        )
        .route(
            "/contact/messages/{id}",
            get(actions::get_contact_message)
                .put(actions::update_contact_message)
                .delete(actions::delete_contact_message),
        )
        .route(
            "/contact/messages/{id}/status",
            axum::routing::put(actions::update_contact_status),
        )
        .route("/contact/stats", get(actions::contact_stats));

    Router::new()
        .nest("/api", api_router)
        .route("/health", get(actions::health))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(middleware::from_fn(sentry_error_middleware))
        .layer(cors)
}

/// Serve until `shutdown` resolves, letting in-flight requests finish
pub async fn start_web_server<F>(
    interface: &str,
    port: u16,
    app: Router,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    sentry::configure_scope(|scope| {
        scope.set_tag("operation", "web-server");
    });
    actions::init_server_start_time();

    let address = format!("{}:{}", interface, port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!("Web server listening on http://{}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("web server failed")?;

    info!("Web server stopped");
    Ok(())
}
