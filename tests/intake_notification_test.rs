mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, StatusCode};
use serde_json::{Value, json};

use advisory_backend::email::EmailProvider;
use advisory_backend::notifications::DeliveryChannel;
use advisory_backend::notifier::{Notifier, NotifierConfig, NotifierService};
use advisory_backend::web::AppState;
use common::{
    FailingEmail, HangingEmail, MemoryAccounts, MemoryConcierge, MemoryLeads, RecordingEmail, get,
    json_request, router, send, unreachable_gateway, wait_for,
};

struct Harness {
    accounts: Arc<MemoryAccounts>,
    leads: Arc<MemoryLeads>,
    notifier: NotifierService,
    app: axum::Router,
}

fn harness(provider: Option<Arc<dyn EmailProvider>>) -> Harness {
    let accounts = MemoryAccounts::with(Vec::new());
    let leads = Arc::new(MemoryLeads::default());
    let concierge = Arc::new(MemoryConcierge::default());
    let channel = DeliveryChannel::new("notify@example.com", vec!["admin@example.com".into()]);
    let notifier = Notifier::start(provider, NotifierConfig::new(channel));

    let state = AppState::new(unreachable_gateway())
        .with_accounts(accounts.clone())
        .with_leads(leads.clone())
        .with_concierge(concierge)
        .with_notifier(notifier.handle());

    Harness {
        accounts,
        leads,
        notifier,
        app: router(state),
    }
}

fn begin_journey(email: &str) -> Value {
    json!({
        "firstName": "Ada",
        "lastName": "Lovelace",
        "email": email,
        "phone": "+44 20 7946 0000",
        "timeZone": "Europe/London",
        "agree": true,
        "offerId": "starter",
        "priceLabel": "$499"
    })
}

fn concierge_request() -> Value {
    json!({
        "contact": {
            "firstName": "Grace",
            "lastName": "Hopper",
            "email": "grace@example.com",
            "phone": "(555) 010-9999",
            "location": "Arlington"
        },
        "selectedServices": ["Tax planning", "Estate review"],
        "specialRequirements": "Weekend calls"
    })
}

#[tokio::test]
async fn test_lead_is_created_while_provider_hangs() {
    let h = harness(Some(Arc::new(HangingEmail)));

    let response = tokio::time::timeout(
        Duration::from_secs(2),
        send(
            &h.app,
            json_request(Method::POST, "/api/start", &begin_journey("ada@example.com")),
        ),
    )
    .await
    .expect("handler must not wait for the email provider");

    let (status, body) = response;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], true);
    assert_eq!(body["leadId"], 1);
    assert_eq!(body["accountId"], 1);

    let report = h.notifier.shutdown(Duration::from_millis(100)).await;
    assert!(report.timed_out);
}

#[tokio::test]
async fn test_failing_provider_is_invisible_to_the_caller() {
    let h = harness(Some(Arc::new(FailingEmail)));
    let handle = h.notifier.handle();

    let (status, body) = send(
        &h.app,
        json_request(Method::POST, "/api/start", &begin_journey("ada@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], true);

    assert!(wait_for(|| handle.stats().failed == 1).await);
    assert_eq!(handle.stats().sent, 0);
    assert_eq!(h.leads.leads.lock().unwrap().len(), 1);

    h.notifier.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_lead_notification_is_delivered_and_accounts_are_reused() {
    let email = Arc::new(RecordingEmail::default());
    let h = harness(Some(email.clone()));

    let (status, first) = send(
        &h.app,
        json_request(Method::POST, "/api/start", &begin_journey("Ada@Example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, second) = send(
        &h.app,
        json_request(Method::POST, "/api/start", &begin_journey("  ada@example.com ")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    assert_eq!(first["accountId"], second["accountId"]);
    assert_ne!(first["leadId"], second["leadId"]);
    assert_eq!(h.accounts.count(), 1);

    assert!(wait_for(|| email.sent.lock().unwrap().len() == 2).await);
    {
        let sent = email.sent.lock().unwrap();
        assert_eq!(sent[0].subject, "New Lead: Ada Lovelace");
        assert_eq!(sent[0].to, vec!["admin@example.com".to_string()]);
        assert_eq!(sent[0].reply_to.as_deref(), Some("ada@example.com"));
    }

    let (status, body) = send(&h.app, get("/api/start/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lead"]["email"], "ada@example.com");
    assert_eq!(body["lead"]["offerId"], "starter");

    let (_, body) = send(&h.app, get("/api/start?limit=1")).await;
    assert_eq!(body["leads"].as_array().unwrap().len(), 1);

    let (status, body) = send(&h.app, get("/api/start/99")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NOT_FOUND");

    let report = h.notifier.shutdown(Duration::from_secs(1)).await;
    assert_eq!(report.discarded, 0);
    assert!(!report.timed_out);
}

#[tokio::test]
async fn test_invalid_lead_is_rejected_without_side_effects() {
    let email = Arc::new(RecordingEmail::default());
    let h = harness(Some(email.clone()));

    let mut body = begin_journey("not-an-email");
    body["agree"] = json!(false);

    let (status, response) = send(&h.app, json_request(Method::POST, "/api/start", &body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(response["ok"], false);
    assert_eq!(response["error"], "VALIDATION_ERROR");
    assert_eq!(response["details"]["email"], "Invalid email format");
    assert_eq!(response["details"]["agree"], "You must agree to continue");

    assert_eq!(h.accounts.calls(), 0);
    assert!(h.leads.leads.lock().unwrap().is_empty());
    assert_eq!(h.notifier.handle().stats().submitted, 0);

    h.notifier.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_malformed_json_is_a_validation_error() {
    let h = harness(None);
    let request = axum::http::Request::builder()
        .method(Method::POST)
        .uri("/api/start")
        .header("content-type", "application/json")
        .body(axum::body::Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&h.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_concierge_request_notifies_admins() {
    let email = Arc::new(RecordingEmail::default());
    let h = harness(Some(email.clone()));

    let (status, body) = send(
        &h.app,
        json_request(Method::POST, "/api/concierge", &concierge_request()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["submissionId"], 1);

    assert!(wait_for(|| email.sent.lock().unwrap().len() == 1).await);
    assert_eq!(
        email.sent.lock().unwrap()[0].subject,
        "New Concierge Request: Grace Hopper"
    );

    let (status, body) = send(&h.app, get("/api/concierge/1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["serviceCount"], 2);
    assert_eq!(body["request"]["location"], "Arlington");

    let (_, body) = send(&h.app, get("/api/concierge")).await;
    assert_eq!(body["count"], 1);

    let (status, body) = send(&h.app, get("/api/concierge/5")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Request not found");

    h.notifier.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_disabled_notifier_still_accepts_submissions() {
    let h = harness(None);
    assert!(!h.notifier.handle().is_enabled());

    let (status, _) = send(
        &h.app,
        json_request(Method::POST, "/api/concierge", &concierge_request()),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &h.app,
        json_request(Method::POST, "/api/start", &begin_journey("ada@example.com")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_health_reports_degraded_database() {
    let h = harness(None);

    let (status, body) = send(&h.app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["database"], "unavailable");
    assert_eq!(body["notifier"]["enabled"], false);
}
