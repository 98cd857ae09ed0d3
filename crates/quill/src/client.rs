// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client commands: `send`, `resume`, `status`, `approve`, `reject`.
//!
//! All of them talk to a running gateway over HTTP using the `[client]`
//! configuration section.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use quill_client::session::UpdateSink;
use quill_client::{
    ExecutionApi, HttpApi, SessionController, SessionSettings, SessionUpdate, StateStore,
};
use quill_config::model::QuillConfig;
use quill_core::QuillError;
use tokio::sync::mpsc;

fn http_api(config: &QuillConfig) -> Result<HttpApi, QuillError> {
    HttpApi::new(&config.client.server_url, config.client.token.as_deref())
}

async fn controller(config: &QuillConfig) -> Result<SessionController, QuillError> {
    let api: Arc<dyn ExecutionApi> = Arc::new(http_api(config)?);
    let state = StateStore::open(&config.client.state_path).await?;
    Ok(SessionController::new(
        api,
        Arc::new(state),
        SessionSettings::from_config(&config.client),
    ))
}

/// Render session updates as they arrive.
fn render(update: &SessionUpdate, thread_id: &str) {
    let mut stdout = std::io::stdout();
    match update {
        SessionUpdate::Submitted { request_id, .. } => {
            eprintln!("request {request_id}");
        }
        SessionUpdate::TextDelta { text, .. } => {
            print!("{text}");
            let _ = stdout.flush();
        }
        SessionUpdate::ApprovalRequired {
            tool_call_id,
            name,
            input,
            ..
        } => {
            println!();
            eprintln!("approval required: {name} {input}");
            eprintln!("  quill approve {tool_call_id}");
            eprintln!("  quill reject {tool_call_id} --reason \"...\"");
        }
        SessionUpdate::Completed { .. } => println!(),
        SessionUpdate::Failed { message, .. } => {
            println!();
            eprintln!("request failed: {message}");
        }
        SessionUpdate::Detached {
            request_id,
            reconnect,
        } => {
            println!();
            if *reconnect {
                eprintln!("request {request_id} is still running; follow it with `quill resume --thread {thread_id}`");
            } else {
                eprintln!("server unreachable; request {request_id} is saved, retry with `quill resume --thread {thread_id}`");
            }
        }
    }
}

/// Drive a session while a printer task renders its updates.
async fn follow<F, Fut>(thread_id: &str, session: F) -> Result<ExitCode, QuillError>
where
    F: FnOnce(UpdateSink) -> Fut,
    Fut: Future<Output = Result<SessionUpdate, QuillError>>,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let thread = thread_id.to_string();
    let printer = tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            render(&update, &thread);
        }
    });

    let outcome = session(tx).await;
    // The sender was moved into the session; the printer ends once it drains.
    let _ = printer.await;

    match outcome? {
        SessionUpdate::Failed { .. } => Ok(ExitCode::FAILURE),
        _ => Ok(ExitCode::SUCCESS),
    }
}

pub async fn run_send(
    config: &QuillConfig,
    thread_id: &str,
    content: &str,
) -> Result<ExitCode, QuillError> {
    let controller = controller(config).await?;
    follow(thread_id, |tx| async move {
        controller.send(thread_id, content, &tx).await
    })
    .await
}

pub async fn run_resume(config: &QuillConfig, thread_id: &str) -> Result<ExitCode, QuillError> {
    let controller = controller(config).await?;
    follow(thread_id, |tx| async move { controller.resume(thread_id, &tx).await }).await
}

pub async fn run_status(config: &QuillConfig, request_id: &str) -> Result<ExitCode, QuillError> {
    let view = http_api(config)?.status(request_id).await?;
    let json = serde_json::to_string_pretty(&view)
        .map_err(|e| QuillError::Internal(format!("failed to render status: {e}")))?;
    println!("{json}");
    Ok(ExitCode::SUCCESS)
}

pub async fn run_approve(config: &QuillConfig, tool_call_id: &str) -> Result<ExitCode, QuillError> {
    let call = http_api(config)?.approve(tool_call_id).await?;
    println!("tool call {} {}", call.id, call.status);
    Ok(ExitCode::SUCCESS)
}

pub async fn run_reject(
    config: &QuillConfig,
    tool_call_id: &str,
    reason: Option<&str>,
) -> Result<ExitCode, QuillError> {
    let call = http_api(config)?.reject(tool_call_id, reason).await?;
    println!("tool call {} {}", call.id, call.status);
    Ok(ExitCode::SUCCESS)
}
