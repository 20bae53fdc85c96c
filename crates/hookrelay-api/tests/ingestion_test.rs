//! Ingest endpoint tests.
//!
//! Drives the router with `oneshot` and inspects the dispatch queue to verify
//! what was admitted. Every request must be answered with 204.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{HeaderName, Request, StatusCode},
    Router,
};
use futures::StreamExt;
use hookrelay_api::{create_router, AppState};
use hookrelay_delivery::{queue, EngineStats, QueueConfig, QueueReceiver};
use tokio::sync::RwLock;
use tower::ServiceExt;

const INGEST_PATH: &str = "/integration";

fn app_with(config: QueueConfig, max_body_bytes: usize) -> (Router, QueueReceiver) {
    let (queue, receiver) = queue::channel(&config);
    let state = AppState {
        queue,
        stats: Arc::new(RwLock::new(EngineStats::default())),
        target_header: HeaderName::from_static("x-target"),
        max_body_bytes,
    };
    (create_router(state, INGEST_PATH), receiver)
}

fn app() -> (Router, QueueReceiver) {
    app_with(QueueConfig::default(), 1024)
}

fn post(target: Option<&str>, body: impl Into<Body>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(INGEST_PATH);
    if let Some(target) = target {
        builder = builder.header("X-Target", target);
    }
    builder.body(body.into()).unwrap()
}

#[tokio::test]
async fn valid_request_enqueues_canonical_json() {
    let (app, receiver) = app();

    let response = app
        .oneshot(post(Some("https://sink.example/hook"), "{ \"b\": true, \"a\": 1 }"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(body.is_empty());

    assert_eq!(receiver.depth(), 1);
    let message = receiver.recv().await.unwrap();
    assert_eq!(message.target, "https://sink.example/hook");
    assert_eq!(message.body, r#"{"b":true,"a":1}"#);
}

#[tokio::test]
async fn non_json_body_enqueued_verbatim() {
    let (app, receiver) = app();

    let response = app.oneshot(post(Some("https://sink.example/hook"), "{bad json")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(receiver.recv().await.unwrap().body, "{bad json");
}

#[tokio::test]
async fn missing_target_acknowledged_but_dropped() {
    let (app, receiver) = app();

    let response = app.oneshot(post(None, r#"{"a":1}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(receiver.depth(), 0);
}

#[tokio::test]
async fn empty_target_acknowledged_but_dropped() {
    let (app, receiver) = app();

    let response = app.oneshot(post(Some(""), r#"{"a":1}"#)).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(receiver.depth(), 0);
}

#[tokio::test]
async fn empty_body_acknowledged_but_dropped() {
    let (app, receiver) = app();

    let response = app.oneshot(post(Some("https://sink.example/hook"), "")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(receiver.depth(), 0);
}

#[tokio::test]
async fn oversized_body_acknowledged_but_dropped() {
    let (app, receiver) = app_with(QueueConfig::default(), 16);

    let response =
        app.oneshot(post(Some("https://sink.example/hook"), "x".repeat(64))).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(receiver.depth(), 0);
}

#[tokio::test]
async fn non_utf8_body_acknowledged_but_dropped() {
    let (app, receiver) = app();

    let response =
        app.oneshot(post(Some("https://sink.example/hook"), vec![0xff_u8, 0xfe, 0xfd])).await.unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(receiver.depth(), 0);
}

#[tokio::test]
async fn full_queue_still_acknowledged() {
    let (app, receiver) = app_with(QueueConfig { max_depth: Some(1) }, 1024);

    for n in 0..3 {
        let response = app
            .clone()
            .oneshot(post(Some("https://sink.example/hook"), format!("{{\"n\":{n}}}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    assert_eq!(receiver.depth(), 1);
    assert_eq!(receiver.recv().await.unwrap().body, r#"{"n":0}"#);
}

#[tokio::test(start_paused = true)]
async fn stalled_body_upload_still_acknowledged() {
    let (app, receiver) = app();
    let stalled = futures::stream::iter([Ok::<_, std::io::Error>(br#"{"a":"#.to_vec())])
        .chain(futures::stream::pending());

    let response = app
        .oneshot(post(Some("https://sink.example/hook"), Body::from_stream(stalled)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(receiver.depth(), 0);
}

#[tokio::test]
async fn responses_carry_request_id() {
    let (app, _receiver) = app();

    let response = app.oneshot(post(Some("https://sink.example/hook"), "{}")).await.unwrap();

    let request_id = response.headers().get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid_like(request_id), "unexpected request id {request_id}");
}

#[tokio::test]
async fn get_on_ingest_path_not_allowed() {
    let (app, _receiver) = app();

    let request = Request::builder().method("GET").uri(INGEST_PATH).body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

fn uuid_like(value: &str) -> bool {
    value.len() == 36 && value.chars().filter(|c| *c == '-').count() == 4
}
