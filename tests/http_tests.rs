// Integration tests for the HTTP API
//
// Requests go straight to the router through `tower::ServiceExt::oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use common::{harness, ScriptedModel};
use loqa_coach::http::{create_router, AppState};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let h = harness(ScriptedModel::new(vec![]));
    create_router(AppState::new(h.services))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    let request = match body {
        Some(body) => request.body(Body::from(body.to_string())).unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn new_session(option: &str, connect: bool) -> Value {
    json!({
        "topic": "recursion",
        "coachingOption": option,
        "expertName": "Joanna",
        "connect": connect
    })
}

#[tokio::test]
async fn test_health_check() {
    let app = app();
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_list_coaching_options() {
    let app = app();
    let (status, body) = send(&app, "GET", "/coaching-options", None).await;

    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["options"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"Lecture on Topic"));
    assert_eq!(body["experts"][0]["name"], "Joanna");
}

#[tokio::test]
async fn test_create_without_connect() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/sessions",
        Some(new_session("Mock Interview", false)),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "idle");
    assert!(body["sessionId"].as_str().is_some());
}

#[tokio::test]
async fn test_unknown_option_is_bad_request() {
    let app = app();
    let (status, body) = send(&app, "POST", "/sessions", Some(new_session("Karaoke", true))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Karaoke"));
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = app();
    let (status, _) = send(&app, "GET", "/sessions/nope/status", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/sessions/nope/pause", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = app();
    let (status, body) = send(
        &app,
        "POST",
        "/sessions",
        Some(new_session("Lecture on Topic", true)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["state"], "listening");
    let id = body["sessionId"].as_str().unwrap().to_string();

    let (status, body) = send(&app, "GET", &format!("/sessions/{id}/status"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["topic"], "recursion");
    assert_eq!(body["recognitionActive"], true);

    let (status, body) = send(&app, "POST", &format!("/sessions/{id}/pause"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "paused");

    let (status, _) = send(
        &app,
        "POST",
        &format!("/sessions/{id}/reset-recognition"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", &format!("/sessions/{id}/resume"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "listening");

    let (status, body) = send(&app, "POST", &format!("/sessions/{id}/disconnect"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessionId"], id.as_str());
    assert_eq!(body["flushed"], true);
    assert_eq!(body["feedback"]["status"], "skipped");

    // Ended sessions leave the live set but stay readable from the store
    let (status, _) = send(&app, "GET", &format!("/sessions/{id}/status"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", &format!("/sessions/{id}/conversation"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));

    let (status, body) = send(&app, "GET", &format!("/sessions/{id}/feedback"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["feedback"], Value::Null);
}
