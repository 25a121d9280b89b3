//! Integration tests for the HTTP API: lead CRUD, stats, transport
//! lifecycle and operator auth, exercised through the full router.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use leadflow::config::AppConfig;
use leadflow::server::{build_state, create_app};
use leadflow::store::{FileLeadStore, LeadStore};
use serde_json::{Value, json};
use tower::ServiceExt;

struct TestApp {
    _dir: tempfile::TempDir,
    app: Router,
}

async fn test_app() -> TestApp {
    test_app_with_config(AppConfig {
        profile: "test".to_string(),
        store_backend: "file".to_string(),
        ..Default::default()
    })
    .await
}

async fn test_app_with_config(config: AppConfig) -> TestApp {
    let dir = tempfile::tempdir().expect("temp dir");
    let store: Arc<dyn LeadStore> = Arc::new(
        FileLeadStore::open(dir.path().join("leads.json"))
            .await
            .expect("store should open"),
    );
    let state = build_state(config, store).expect("state should build");
    TestApp {
        _dir: dir,
        app: create_app(state),
    }
}

async fn send_json(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(body.to_string())).unwrap()
        }
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn post_leads_upserts_by_phone() {
    let t = test_app().await;

    let (status, created) = send_json(
        &t.app,
        "POST",
        "/leads",
        Some(json!({
            "phone": "+994 50 111 22 33",
            "display_name": "Ali",
            "last_message": "manual note"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["phone"], "994501112233");
    assert_eq!(created["status"], "new");
    assert_eq!(created["source"], "manual");

    // Same phone again: update, not a second lead.
    let (status, updated) = send_json(
        &t.app,
        "POST",
        "/leads",
        Some(json!({
            "phone": "994501112233",
            "last_message": "newer note",
            "status": "potential"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["id"], created["id"]);
    assert_eq!(updated["last_message"], "newer note");
    // Display name was not supplied; it must survive the merge.
    assert_eq!(updated["display_name"], "Ali");
    // Status supplied on an existing lead is an explicit reclassification.
    assert_eq!(updated["status"], "potential");

    let (status, listed) = send_json(&t.app, "GET", "/leads", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn post_leads_validates_phone_and_value() {
    let t = test_app().await;

    let (status, body) = send_json(
        &t.app,
        "POST",
        "/leads",
        Some(json!({ "phone": "1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, body) = send_json(
        &t.app,
        "POST",
        "/leads",
        Some(json!({ "phone": "994501112233", "value": -5.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn list_leads_applies_filters() {
    let t = test_app().await;

    send_json(
        &t.app,
        "POST",
        "/leads",
        Some(json!({ "phone": "994501112233", "last_message": "price question" })),
    )
    .await;
    send_json(
        &t.app,
        "POST",
        "/leads",
        Some(json!({ "phone": "994502223344", "last_message": "hello", "status": "won" })),
    )
    .await;

    let (status, body) = send_json(&t.app, "GET", "/leads?status=won", None).await;
    assert_eq!(status, StatusCode::OK);
    let leads = body.as_array().unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0]["phone"], "994502223344");

    let (status, body) = send_json(&t.app, "GET", "/leads?search=price", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send_json(&t.app, "GET", "/leads?status=bogus", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");

    let (status, _) = send_json(&t.app, "GET", "/leads?limit=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_and_value_updates_return_404_for_unknown_leads() {
    let t = test_app().await;
    let missing = uuid::Uuid::new_v4();

    let (status, body) = send_json(
        &t.app,
        "PUT",
        &format!("/leads/{missing}/status"),
        Some(json!({ "status": "lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = send_json(
        &t.app,
        "PUT",
        &format!("/leads/{missing}/value"),
        Some(json!({ "value": 10.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&t.app, "DELETE", &format!("/leads/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(
        &t.app,
        "PUT",
        "/leads/not-a-uuid/status",
        Some(json!({ "status": "lost" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_lifecycle_and_delete() {
    let t = test_app().await;

    let (_, created) = send_json(
        &t.app,
        "POST",
        "/leads",
        Some(json!({ "phone": "994501112233" })),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_string();

    let (status, updated) = send_json(
        &t.app,
        "PUT",
        &format!("/leads/{id}/status"),
        Some(json!({ "status": "won" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "won");

    let (status, updated) = send_json(
        &t.app,
        "PUT",
        &format!("/leads/{id}/value"),
        Some(json!({ "value": 250.0 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["value"], 250.0);

    let (status, stats) = send_json(&t.app, "GET", "/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total"], 1);
    assert_eq!(stats["won"], 1);
    assert_eq!(stats["won_value_sum"], 250.0);

    let (status, deleted) = send_json(&t.app, "DELETE", &format!("/leads/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"].as_str().unwrap(), id);

    let (status, _) = send_json(&t.app, "DELETE", &format!("/leads/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn transport_events_flow_through_the_pipeline() {
    let t = test_app().await;

    let (status, body) = send_json(
        &t.app,
        "POST",
        "/transport/events",
        Some(json!({
            "message_id": "m1",
            "sender": "994501112233@c.us",
            "body": "Salam, qiymət?"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "created");

    // Duplicate delivery within the window.
    let (status, body) = send_json(
        &t.app,
        "POST",
        "/transport/events",
        Some(json!({
            "message_id": "m1",
            "sender": "994501112233@c.us",
            "body": "Salam, qiymət?"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "dropped_duplicate");

    // The lead is visible to the dashboard API.
    let (_, listed) = send_json(&t.app, "GET", "/leads", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    // Late contact resolution applies the real name.
    let (status, body) = send_json(
        &t.app,
        "POST",
        "/transport/contacts",
        Some(json!({
            "phone": "994501112233@c.us",
            "external_id": "m1",
            "display_name": "Ali"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["outcome"], "updated");
}

#[tokio::test]
async fn transport_state_machine_rejects_skipped_states() {
    let t = test_app().await;

    let (status, health) = send_json(&t.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["connection_state"], "offline");

    // Ready straight from offline is not a legal transition.
    let (status, body) = send_json(
        &t.app,
        "POST",
        "/transport/state",
        Some(json!({ "event": "ready" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    for event in ["initializing", "authenticated", "ready"] {
        let (status, _) = send_json(
            &t.app,
            "POST",
            "/transport/state",
            Some(json!({ "event": event })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    let (_, health) = send_json(&t.app, "GET", "/health", None).await;
    assert_eq!(health["connection_state"], "ready");

    let (status, _) = send_json(
        &t.app,
        "POST",
        "/transport/state",
        Some(json!({ "event": "disconnected", "reason": "logged out" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, health) = send_json(&t.app, "GET", "/health", None).await;
    assert_eq!(health["connection_state"], "disconnected");
}

#[tokio::test]
async fn operator_tokens_guard_mutating_routes() {
    let t = test_app_with_config(AppConfig {
        profile: "test".to_string(),
        store_backend: "file".to_string(),
        operator_tokens: vec!["secret".to_string()],
        ..Default::default()
    })
    .await;

    // Missing token.
    let (status, body) = send_json(
        &t.app,
        "POST",
        "/leads",
        Some(json!({ "phone": "994501112233" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    // Valid token.
    let request = Request::builder()
        .method("POST")
        .uri("/leads")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer secret")
        .body(Body::from(json!({ "phone": "994501112233" }).to_string()))
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Read-only routes stay open for the dashboard.
    let (status, _) = send_json(&t.app, "GET", "/leads", None).await;
    assert_eq!(status, StatusCode::OK);
}
