//! Full HTTP round-trips with real session tokens and recovery hashing.

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

use api_adapters::metrics::Metrics;
use api_adapters::{router, AppState};
use auth_adapters::JwtSessionProvider;
use common::Harness;

fn app(h: Harness) -> Router {
    let sessions = JwtSessionProvider::new(
        &SecretString::from("integration-secret-at-least-32-chars".to_string()),
        chrono::Duration::days(30),
    );
    router(AppState {
        facade: Arc::new(h.facade),
        sessions: Arc::new(sessions),
        metrics: Arc::new(Metrics::new()),
    })
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn session(app: &Router) -> String {
    let (status, body) = call(app, "POST", "/api/session", None, None).await;
    assert_eq!(status, StatusCode::OK);
    body["data"]["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn ask_answer_vote_and_recover_over_http() {
    let app = app(Harness::new());
    let asker = session(&app).await;
    let helper = session(&app).await;

    let (status, created) = call(
        &app,
        "POST",
        "/api/questions",
        Some(&asker),
        Some(json!({
            "title": "When does the add/drop period end?",
            "body": "Need to swap a lab section.",
            "category": "academic",
            "tags": ["Add Drop"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let question_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, answer) = call(
        &app,
        "POST",
        "/api/answers",
        Some(&helper),
        Some(json!({"questionId": question_id, "body": "Friday of week two."})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["data"]["questionId"], question_id.as_str());
    let answer_id = answer["data"]["id"].as_str().unwrap().to_string();

    let (status, voted) = call(
        &app,
        "POST",
        "/api/votes",
        Some(&asker),
        Some(json!({"targetType": "answer", "targetId": answer_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(voted["data"], json!({"applied": true, "score": 1}));

    let (status, verified) = call(
        &app,
        "POST",
        &format!("/api/answers/{answer_id}/verify"),
        Some(&asker),
        Some(json!({"questionId": question_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["data"]["verified"], true);

    // Move the asker's identity onto a new device
    let (status, issued) = call(&app, "POST", "/api/recovery-code", Some(&asker), None).await;
    assert_eq!(status, StatusCode::OK);
    let code = issued["data"]["code"].as_str().unwrap().to_string();

    let device = session(&app).await;
    let (status, restored) = call(
        &app,
        "POST",
        "/api/recover",
        Some(&device),
        Some(json!({"code": code.to_lowercase()})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(restored["data"]["restoredAt"].is_string());

    // The new device now owns the question
    let (status, _) = call(
        &app,
        "PATCH",
        &format!("/api/questions/{question_id}"),
        Some(&device),
        Some(json!({"title": "Add/drop deadline?", "body": "Lab swap."})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        &app,
        "POST",
        "/api/recover",
        Some(&helper),
        Some(json!({"code": code})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid-recovery-code");
}

#[tokio::test]
async fn forbidden_delete_and_unknown_route_action() {
    let app = app(Harness::new());
    let owner = session(&app).await;
    let stranger = session(&app).await;

    let (_, created) = call(
        &app,
        "POST",
        "/api/questions",
        Some(&owner),
        Some(json!({"title": "Gym hours", "body": "Open late?", "category": "facilities"})),
    )
    .await;
    let question_id = created["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call(
        &app,
        "DELETE",
        &format!("/api/questions/{question_id}"),
        Some(&stranger),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "forbidden");

    let (status, body) = call(&app, "GET", "/api/rate-limit/vote", Some(&stranger), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["limit"], 80);
    assert_eq!(body["data"]["action"], "vote");

    let (status, body) = call(&app, "GET", "/api/rate-limit/teleport", Some(&stranger), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid-input");
}
