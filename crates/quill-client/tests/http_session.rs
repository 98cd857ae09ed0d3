// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session controller against a real gateway over HTTP.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quill_client::{
    ExecutionApi, HttpApi, SessionController, SessionSettings, SessionUpdate, StateStore,
};
use quill_config::model::GatewayConfig;
use quill_core::{ApprovalStatus, QuillError};
use quill_gateway::GatewayState;
use quill_test_utils::{MockTurn, TEST_OWNER, TEST_THREAD, TestHarness};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

struct Server {
    addr: SocketAddr,
    shutdown: CancellationToken,
    handle: JoinHandle<Result<(), QuillError>>,
}

async fn serve(harness: &TestHarness) -> Server {
    let config = GatewayConfig {
        tokens: BTreeMap::from([("tok-alice".to_string(), TEST_OWNER.to_string())]),
        keep_alive_secs: 1,
        ..GatewayConfig::default()
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let state = GatewayState::new(harness.runtime.clone(), &config);
    let handle = tokio::spawn(quill_gateway::serve(listener, state, shutdown.clone()));
    Server {
        addr,
        shutdown,
        handle,
    }
}

fn api(server: &Server) -> HttpApi {
    HttpApi::new(&format!("http://{}", server.addr), Some("tok-alice")).unwrap()
}

async fn controller(server: &Server, dir: &tempfile::TempDir) -> SessionController {
    let state = StateStore::open(dir.path().join("state.json")).await.unwrap();
    SessionController::new(
        Arc::new(api(server)),
        Arc::new(state),
        SessionSettings {
            poll_interval: Duration::from_millis(10),
            max_polls: 2,
        },
    )
}

#[tokio::test]
async fn send_streams_over_sse_to_completion() {
    let harness = TestHarness::builder()
        .with_turns(vec![MockTurn::text(&["Hello", " world", "!"])])
        .build()
        .await
        .unwrap();
    let server = serve(&harness).await;
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(&server, &dir).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let outcome = controller.send(TEST_THREAD, "Say hello", &tx).await.unwrap();
    let SessionUpdate::Completed { message, .. } = outcome else {
        panic!("expected completion, got {outcome:?}");
    };
    assert_eq!(message.text(), "Hello world!");

    let mut deltas = Vec::new();
    while let Ok(update) = rx.try_recv() {
        if let SessionUpdate::TextDelta { text, .. } = update {
            deltas.push(text);
        }
    }
    assert_eq!(deltas, vec!["Hello", " world", "!"]);

    server.shutdown.cancel();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn approval_round_trip_over_http() {
    let harness = TestHarness::builder()
        .with_turns(vec![
            MockTurn::tool("tc-1", "write_file", json!({"path": "a.txt"})),
            MockTurn::text(&["Finished."]),
        ])
        .build()
        .await
        .unwrap();
    let server = serve(&harness).await;
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(&server, &dir).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let session = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.send(TEST_THREAD, "Write", &tx).await })
    };
    let tool_call_id = loop {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
            Ok(Some(SessionUpdate::ApprovalRequired { tool_call_id, .. })) => break tool_call_id,
            Ok(Some(_)) => continue,
            other => panic!("no approval request: {other:?}"),
        }
    };
    controller.approve(&tool_call_id).await.unwrap();

    let err = api(&server).approve(&tool_call_id).await.unwrap_err();
    assert!(
        matches!(
            err,
            QuillError::AlreadyDecided { .. } | QuillError::IllegalTransition { .. }
        ),
        "got {err:?}"
    );

    let outcome = tokio::time::timeout(Duration::from_secs(10), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(
        matches!(outcome, SessionUpdate::Completed { ref message, .. } if message.text().ends_with("Finished.")),
        "got {outcome:?}"
    );

    let call = harness
        .runtime
        .tool_call(TEST_OWNER, &tool_call_id)
        .await
        .unwrap();
    assert_eq!(call.status, ApprovalStatus::Approved);

    server.shutdown.cancel();
    server.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn gateway_shutdown_detaches_a_paused_session() {
    let harness = TestHarness::builder()
        .with_turns(vec![MockTurn::tool("tc-1", "write_file", json!({}))])
        .build()
        .await
        .unwrap();
    let server = serve(&harness).await;
    let dir = tempfile::tempdir().unwrap();
    let controller = controller(&server, &dir).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let session = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.send(TEST_THREAD, "Write", &tx).await })
    };
    loop {
        match tokio::time::timeout(Duration::from_secs(10), rx.recv()).await {
            Ok(Some(SessionUpdate::ApprovalRequired { .. })) => break,
            Ok(Some(_)) => continue,
            other => panic!("no approval request: {other:?}"),
        }
    }

    server.shutdown.cancel();
    server.handle.await.unwrap().unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(10), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(
        matches!(outcome, SessionUpdate::Detached { .. }),
        "got {outcome:?}"
    );
    let entry = controller.state().thread(TEST_THREAD).await.unwrap();
    assert!(entry.request_id.is_some(), "request stays recorded for resume");
}
