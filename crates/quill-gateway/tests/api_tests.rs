// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router tests driving the gateway with `tower::ServiceExt::oneshot`.

use std::collections::BTreeMap;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use quill_config::model::GatewayConfig;
use quill_core::EventKind;
use quill_gateway::{GatewayState, router};
use quill_test_utils::{MockTurn, TestHarness};
use serde_json::{Value, json};
use tower::ServiceExt;

const ALICE: &str = "Bearer tok-alice";
const BOB: &str = "Bearer tok-bob";

fn app(harness: &TestHarness) -> Router {
    let config = GatewayConfig {
        tokens: BTreeMap::from([
            ("tok-alice".to_string(), "alice".to_string()),
            ("tok-bob".to_string(), "bob".to_string()),
        ]),
        ..GatewayConfig::default()
    };
    router(GatewayState::new(harness.runtime.clone(), &config))
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    (status, body)
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::get(uri)
        .header("authorization", token)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("authorization", token)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn submit(key: &str, content: &str) -> Request<Body> {
    Request::post("/v1/requests")
        .header("authorization", ALICE)
        .header("content-type", "application/json")
        .header("idempotency-key", key)
        .body(Body::from(
            json!({"thread_id": "thread-1", "content": content}).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let (status, body) = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn api_requires_a_known_token() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);

    let (status, body) = send(&app, Request::get("/v1/requests/x").body(Body::empty()).unwrap()).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = send(&app, get("/v1/requests/x", "Bearer nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn no_configured_tokens_rejects_everything() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = router(GatewayState::new(harness.runtime.clone(), &GatewayConfig::default()));
    let (status, _) = send(&app, get("/v1/requests/x", ALICE)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submission_requires_idempotency_key_and_content() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);

    let (status, body) = send(
        &app,
        post_json("/v1/requests", ALICE, json!({"thread_id": "t", "content": "hi"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");

    let (status, body) = send(&app, submit("k-empty", "   ")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation");
}

#[tokio::test]
async fn duplicate_submission_returns_the_original_request() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);

    let (status, first) = send(&app, submit("k1", "Say hello")).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["created"], true);

    let (status, second) = send(&app, submit("k1", "Say hello")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["created"], false);
    assert_eq!(first["request_id"], second["request_id"]);
    assert_eq!(first["provisional_message_id"], second["provisional_message_id"]);
}

#[tokio::test]
async fn completed_request_is_readable_through_every_endpoint() {
    let harness = TestHarness::builder()
        .with_turns(vec![MockTurn::text(&["Hello", " world", "!"])])
        .build()
        .await
        .unwrap();
    let app = app(&harness);

    let (_, sub) = send(&app, submit("k1", "Say hello")).await;
    let request_id = sub["request_id"].as_str().unwrap().to_string();
    harness.wait_for_terminal(&request_id).await.unwrap();

    let (status, view) = send(&app, get(&format!("/v1/requests/{request_id}"), ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "completed");
    assert_eq!(view["progress"], 1.0);
    assert_eq!(view["result_message_id"], sub["provisional_message_id"]);

    let (status, events) =
        send(&app, get(&format!("/v1/requests/{request_id}/events"), ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    let types: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["payload"]["type"].as_str().unwrap())
        .collect();
    assert_eq!(
        types,
        vec!["context_ready", "text_chunk", "text_chunk", "text_chunk", "completion"]
    );

    let (_, tail) = send(
        &app,
        get(&format!("/v1/requests/{request_id}/events?after=3"), ALICE),
    )
    .await;
    let seqs: Vec<i64> = tail
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, vec![4, 5]);

    let message_id = sub["provisional_message_id"].as_str().unwrap();
    let (status, message) = send(&app, get(&format!("/v1/messages/{message_id}"), ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(message["blocks"][0]["text"], "Hello world!");
    assert_eq!(message["status"], "complete");
}

#[tokio::test]
async fn requests_are_scoped_to_their_owner() {
    let harness = TestHarness::builder().build().await.unwrap();
    let app = app(&harness);
    let (_, sub) = send(&app, submit("k1", "mine")).await;
    let request_id = sub["request_id"].as_str().unwrap();

    let (status, body) = send(&app, get(&format!("/v1/requests/{request_id}"), BOB)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    let (status, _) = send(&app, get("/v1/requests/does-not-exist", ALICE)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sse_stream_replays_and_honours_cursor() {
    let harness = TestHarness::builder()
        .with_turns(vec![MockTurn::text(&["Hello", " world", "!"])])
        .build()
        .await
        .unwrap();
    let app = app(&harness);
    let (_, sub) = send(&app, submit("k1", "Say hello")).await;
    let request_id = sub["request_id"].as_str().unwrap().to_string();
    harness.wait_for_terminal(&request_id).await.unwrap();

    let (status, body) = send(&app, get(&format!("/v1/requests/{request_id}/stream"), ALICE)).await;
    assert_eq!(status, StatusCode::OK);
    let text = body.as_str().unwrap();
    assert!(text.contains("event: context_ready"));
    assert!(text.contains("id: 5"));
    assert!(text.contains("event: completion"));
    assert_eq!(text.matches("event: text_chunk").count(), 3);

    let request = Request::get(format!("/v1/requests/{request_id}/stream"))
        .header("authorization", ALICE)
        .header("last-event-id", "4")
        .body(Body::empty())
        .unwrap();
    let (_, body) = send(&app, request).await;
    let text = body.as_str().unwrap();
    assert!(!text.contains("event: text_chunk"));
    assert!(text.contains("event: completion"));
}

#[tokio::test]
async fn approval_decisions_over_http() {
    let harness = TestHarness::builder()
        .with_turns(vec![
            MockTurn::tool("tc-1", "write_file", json!({"path": "a.txt"})),
            MockTurn::text(&["Done."]),
        ])
        .build()
        .await
        .unwrap();
    let app = app(&harness);
    let (_, sub) = send(&app, submit("k1", "Write")).await;
    let request_id = sub["request_id"].as_str().unwrap().to_string();
    harness.wait_for_tool_call(&request_id).await.unwrap();

    let (status, _) = send(&app, post_json("/v1/tool-calls/tc-1/approve", BOB, json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "other users cannot decide");

    let (status, call) = send(&app, post_json("/v1/tool-calls/tc-1/approve", ALICE, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(call["status"], "approved");

    let (status, body) = send(
        &app,
        post_json("/v1/tool-calls/tc-1/reject", ALICE, json!({"reason": "changed my mind"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["code"] == "already_decided" || body["code"] == "illegal_transition");

    let events = harness.wait_for_terminal(&request_id).await.unwrap();
    assert_eq!(events.last().unwrap().payload.kind(), EventKind::Completion);
}

#[tokio::test]
async fn reject_accepts_an_empty_body() {
    let harness = TestHarness::builder()
        .with_turns(vec![
            MockTurn::tool("tc-1", "write_file", json!({})),
            MockTurn::text(&["Okay."]),
        ])
        .build()
        .await
        .unwrap();
    let app = app(&harness);
    let (_, sub) = send(&app, submit("k1", "Write")).await;
    let request_id = sub["request_id"].as_str().unwrap().to_string();
    harness.wait_for_tool_call(&request_id).await.unwrap();

    let request = Request::post("/v1/tool-calls/tc-1/reject")
        .header("authorization", ALICE)
        .body(Body::empty())
        .unwrap();
    let (status, call) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(call["status"], "rejected");
    assert_eq!(call["reason"], Value::Null);
}
