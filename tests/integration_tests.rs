use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use qwen3_service::server::{router, AppState};
use qwen3_service::{GenerationSession, MockBackend, ServiceConfig};

const END: u32 = 151668;

/// 15 generated tokens with `</think>` at index 10.
fn two_plus_two() -> MockBackend {
    let mut output: Vec<u32> = (100..115).collect();
    output[10] = END;
    MockBackend::new(output)
        .with_vocab([(100, "\nOkay"), (109, ", it is four.\n"), (111, "\n\n2 + 2 = 4")])
        .with_special([END])
}

/// Same reply, but `</think>` decodes to its text the way Qwen3's tokenizer does.
fn two_plus_two_visible_tag() -> MockBackend {
    let mut output: Vec<u32> = (100..115).collect();
    output[10] = END;
    MockBackend::new(output).with_vocab([
        (100, "\nOkay"),
        (109, ", it is four.\n"),
        (END, "</think>"),
        (111, "\n\n2 + 2 = 4"),
    ])
}

fn app(backend: &MockBackend) -> (Router, Arc<GenerationSession>) {
    let session = Arc::new(GenerationSession::new(Arc::new(backend.clone()), "/app/model"));
    (router(AppState::new(Arc::clone(&session))), session)
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).into_owned()));
    (status, json)
}

// -- Health --

#[tokio::test]
async fn health_tracks_model_load() {
    let backend = two_plus_two();
    let (app, session) = app(&backend);

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "unhealthy", "model_loaded": false}));

    session.load().await.unwrap();

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "model_loaded": true}));
}

#[tokio::test]
async fn failed_load_leaves_service_unhealthy() {
    let backend = two_plus_two().failing_loads(1);
    let (app, session) = app(&backend);

    assert!(session.load().await.is_err());

    let (_, body) = send(&app, get("/health")).await;
    assert_eq!(body["model_loaded"], false);
    assert_eq!(body["status"], "unhealthy");
}

// -- Generate --

#[tokio::test]
async fn generate_splits_thinking_from_content() {
    let backend = two_plus_two();
    let (app, session) = app(&backend);
    session.load().await.unwrap();

    let (status, body) = send(&app, json_request("/generate", json!({"message": "What is 2+2?"}))).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");

    let thinking = body["thinking"].as_str().unwrap();
    let content = body["content"].as_str().unwrap();
    assert!(!thinking.is_empty());
    assert!(!content.is_empty());
    assert!(thinking.starts_with("Okay"));
    assert!(thinking.ends_with("it is four."));
    assert!(content.starts_with("2 + 2 = 4"));
    assert!(body["processing_time"].as_f64().unwrap() >= 0.0);
}

#[tokio::test]
async fn generate_uses_default_budget() {
    let backend = two_plus_two();
    let (app, session) = app(&backend);
    session.load().await.unwrap();

    send(&app, json_request("/generate", json!({"message": "hi"}))).await;
    assert_eq!(backend.last_max_new_tokens(), 32768);

    send(&app, json_request("/generate", json!({"message": "hi", "max_new_tokens": 64}))).await;
    assert_eq!(backend.last_max_new_tokens(), 64);
}

#[tokio::test]
async fn generate_uses_configured_budget() {
    let backend = two_plus_two();
    let config = ServiceConfig {
        max_new_tokens: 64,
        ..Default::default()
    };
    let session = Arc::new(GenerationSession::from_config(Arc::new(backend.clone()), &config));
    let app = router(AppState::new(Arc::clone(&session)));
    session.load().await.unwrap();

    let (status, _) = send(&app, json_request("/generate", json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(backend.last_max_new_tokens(), 64);
}

#[tokio::test]
async fn generate_strips_visible_think_tag() {
    let backend = two_plus_two_visible_tag();
    let (app, session) = app(&backend);
    session.load().await.unwrap();

    let (status, body) = send(&app, json_request("/generate", json!({"message": "What is 2+2?"}))).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");

    let thinking = body["thinking"].as_str().unwrap();
    let content = body["content"].as_str().unwrap();
    assert!(!thinking.contains("</think>"));
    assert!(!content.contains("</think>"));
    assert!(thinking.ends_with("it is four."));
    assert!(content.starts_with("2 + 2 = 4"));
}

#[tokio::test]
async fn zero_budget_is_unprocessable() {
    let backend = two_plus_two();
    let (app, session) = app(&backend);
    session.load().await.unwrap();

    let (status, body) = send(&app, json_request("/generate", json!({"message": "hi", "max_new_tokens": 0}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["detail"], "max_new_tokens must be at least 1");
    assert_eq!(backend.generate_calls(), 0);
}

#[tokio::test]
async fn generate_before_load_is_unavailable() {
    let backend = two_plus_two();
    let (app, _session) = app(&backend);

    let (status, body) = send(&app, json_request("/generate", json!({"message": "What is 2+2?"}))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"detail": "Model not loaded"}));
    assert_eq!(backend.generate_calls(), 0);
}

#[tokio::test]
async fn generation_failure_is_reported() {
    let backend = two_plus_two().failing_generation("device lost");
    let (app, session) = app(&backend);
    session.load().await.unwrap();

    let (status, body) = send(&app, json_request("/generate", json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Generation failed: device lost");

    // The model stays loaded.
    let (_, body) = send(&app, get("/health")).await;
    assert_eq!(body["model_loaded"], true);
}

#[tokio::test]
async fn malformed_request_is_rejected() {
    let backend = two_plus_two();
    let (app, session) = app(&backend);
    session.load().await.unwrap();

    let (status, _) = send(&app, json_request("/generate", json!({"prompt": "hi"}))).await;
    assert!(status.is_client_error());
    assert_eq!(backend.generate_calls(), 0);
}

// -- UI --

#[tokio::test]
async fn ui_page_is_served() {
    let backend = two_plus_two();
    let (app, _session) = app(&backend);

    let resp = app.clone().oneshot(get("/")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_owned();
    assert!(content_type.starts_with("text/html"));
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&body).contains("Qwen3 Text Generation"));
}

#[tokio::test]
async fn ui_reports_errors_as_text() {
    let backend = two_plus_two().failing_generation("boom");
    let (app, session) = app(&backend);

    let (status, body) = send(&app, json_request("/ui/generate", json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"thinking": "Model not loaded", "content": "Error: Model not loaded"})
    );

    let (_, body) = send(&app, get("/ui/status")).await;
    assert_eq!(body["status"], "Status: Unhealthy\nModel Loaded: No");

    session.load().await.unwrap();

    let (status, body) = send(&app, json_request("/ui/generate", json!({"message": "hi"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"thinking": "", "content": "Error: boom"}));

    let (_, body) = send(&app, get("/ui/status")).await;
    assert_eq!(body["status"], "Status: Healthy\nModel Loaded: Yes");
}

#[tokio::test]
async fn ui_generate_returns_both_spans() {
    let backend = two_plus_two();
    let (app, session) = app(&backend);
    session.load().await.unwrap();

    let (_, body) = send(&app, json_request("/ui/generate", json!({"message": "What is 2+2?"}))).await;
    assert!(body["thinking"].as_str().unwrap().starts_with("Okay"));
    assert!(body["content"].as_str().unwrap().starts_with("2 + 2 = 4"));
    assert_eq!(backend.last_max_new_tokens(), 32768);
}
