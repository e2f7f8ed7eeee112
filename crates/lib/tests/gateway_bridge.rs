//! Bridge endpoint behaviour through the router, with a scripted agent runtime.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use lib::gateway::{router, GatewayState, BRIDGE_PATH};
use lib::session::{AgentRuntime, InteractionResult, SessionManager};
use serde_json::{json, Value};
use tower::ServiceExt;

/// "fail" fails, "silent" answers with whitespace, anything else is echoed.
struct EchoRuntime;

#[async_trait]
impl AgentRuntime for EchoRuntime {
    async fn execute(&mut self, text: &str) -> InteractionResult {
        match text {
            "fail" => InteractionResult::failed("model offline"),
            "silent" => InteractionResult::ok("   "),
            other => InteractionResult::ok(format!("echo: {}", other)),
        }
    }
}

fn app(token: Option<&str>) -> Router {
    let sessions = SessionManager::new(|_: &str| -> Box<dyn AgentRuntime> { Box::new(EchoRuntime) });
    router(GatewayState::new(sessions, token.map(String::from), 8001))
}

async fn post(app: &Router, body: &str, auth: Option<&str>) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method("POST")
        .uri(BRIDGE_PATH)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(auth) = auth {
        req = req.header(header::AUTHORIZATION, auth);
    }
    let res = app
        .clone()
        .oneshot(req.body(Body::from(body.to_string())).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn returns_reply_for_valid_message() {
    let app = app(None);
    let (status, body) = post(&app, r#"{"conversation_id": "iMessage;-;+1555", "message": "hi"}"#, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"reply": "echo: hi"}));
}

#[tokio::test]
async fn empty_reply_is_still_ok() {
    let app = app(None);
    let (status, body) = post(&app, r#"{"conversation_id": "c", "message": "silent"}"#, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"reply": ""}));
}

#[tokio::test]
async fn invalid_requests_are_400() {
    let app = app(None);
    let long_id = "x".repeat(257);
    let bodies = [
        "not json".to_string(),
        r#"{"message": "hi"}"#.to_string(),
        r#"{"conversation_id": "c"}"#.to_string(),
        r#"{"conversation_id": "", "message": "hi"}"#.to_string(),
        r#"{"conversation_id": "c", "message": ""}"#.to_string(),
        format!(r#"{{"conversation_id": "{}", "message": "hi"}}"#, long_id),
    ];
    for body in bodies {
        let (status, value) = post(&app, &body, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body: {}", body);
        assert!(value.get("error").and_then(Value::as_str).is_some());
    }
}

#[tokio::test]
async fn processing_failure_is_502() {
    let app = app(None);
    let (status, body) = post(&app, r#"{"conversation_id": "c", "message": "fail"}"#, None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({"error": "model offline"}));
}

#[tokio::test]
async fn token_is_required_when_configured() {
    let app = app(Some("s3cret"));
    let body = r#"{"conversation_id": "c", "message": "hi"}"#;

    let (status, _) = post(&app, body, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = post(&app, body, Some("Bearer nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, value) = post(&app, body, Some("Bearer s3cret")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(value["reply"], "echo: hi");
}

#[tokio::test]
async fn health_counts_sessions() {
    let app = app(None);
    post(&app, r#"{"conversation_id": "a", "message": "hi"}"#, None).await;
    post(&app, r#"{"conversation_id": "b", "message": "hi"}"#, None).await;
    post(&app, r#"{"conversation_id": "a", "message": "again"}"#, None).await;

    let res = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value, json!({"runtime": "running", "sessions": 2, "port": 8001}));
}
