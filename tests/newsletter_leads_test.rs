mod common;

use std::sync::Arc;

use axum::http::{Method, StatusCode};
use serde_json::json;

use advisory_backend::web::AppState;
use common::{MemoryNewsletter, get, json_request, router, send, unreachable_gateway};

fn setup() -> (Arc<MemoryNewsletter>, axum::Router) {
    let newsletter = Arc::new(MemoryNewsletter::default());
    let state = AppState::new(unreachable_gateway()).with_newsletter(newsletter.clone());
    (newsletter, router(state))
}

#[tokio::test]
async fn test_signup_is_stored_with_default_source() {
    let (newsletter, app) = setup();

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/leads", &json!({ "email": "Sam@Example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["ok"], true);
    assert_eq!(body["id"], 1);
    assert_eq!(body["message"], "Lead added successfully");

    let stored = newsletter.leads.lock().unwrap();
    assert_eq!(stored[0].email, "sam@example.com");
    assert_eq!(stored[0].source, "newsletter");
}

#[tokio::test]
async fn test_signup_rejections_store_nothing() {
    let (newsletter, app) = setup();

    let (status, body) = send(&app, json_request(Method::POST, "/api/leads", &json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "VALIDATION_ERROR");
    assert_eq!(body["details"]["email"], "email is required");

    let (status, body) = send(
        &app,
        json_request(
            Method::POST,
            "/api/leads",
            &json!({ "email": "sam@example.com", "source": "podcast" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["source"], "Invalid source");

    assert!(newsletter.leads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_list_filters_by_source_and_pages() {
    let (_, app) = setup();
    let signups = [
        ("a@example.com", "newsletter"),
        ("b@example.com", "wealth_scan"),
        ("c@example.com", "wealth_scan"),
        ("d@example.com", "contact_form"),
    ];
    for (email, source) in signups {
        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                "/api/leads",
                &json!({ "email": email, "source": source }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = send(&app, get("/api/leads?source=wealth_scan&per_page=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["pages"], 2);
    assert_eq!(body["leads"][0]["email"], "c@example.com");
    assert_eq!(body["leads"][0]["source"], "wealth_scan");

    let (_, body) = send(&app, get("/api/leads?source=unknown")).await;
    assert_eq!(body["total"], 4);
    assert_eq!(body["current_page"], 1);
    assert_eq!(body["per_page"], 20);

    let (status, body) = send(&app, get("/api/leads?page=9223372036854775807")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["leads"].as_array().unwrap().is_empty());
}
