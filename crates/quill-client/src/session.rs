// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client session controller.
//!
//! Follows one request per thread: replay plus live events while the stream
//! holds, status polling once it drops. The three ways a session can end
//! (completed, failed, detached while still running) are reported as
//! distinct [`SessionUpdate`]s and never conflated.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use quill_config::model::ClientConfig;
use quill_core::types::{Message, RequestStatus};
use quill_core::{EventPayload, ExecutionEvent, QuillError};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::ExecutionApi;
use crate::state::{PendingSubmission, StateStore};

/// Progress reported to the caller while a session runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    Submitted {
        thread_id: String,
        request_id: String,
        provisional_message_id: String,
    },
    TextDelta {
        request_id: String,
        text: String,
    },
    /// The request is paused until the tool call is approved or rejected.
    ApprovalRequired {
        request_id: String,
        tool_call_id: String,
        name: String,
        input: serde_json::Value,
    },
    Completed {
        request_id: String,
        message: Message,
    },
    Failed {
        request_id: String,
        message: String,
    },
    /// The client stopped following a request that has not finished.
    ///
    /// `reconnect` is true when the server reported the request as still
    /// running, false when the server could not be reached.
    Detached {
        request_id: String,
        reconnect: bool,
    },
}

impl SessionUpdate {
    /// Whether this update ends a session.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::Completed { .. } | Self::Failed { .. } | Self::Detached { .. }
        )
    }
}

/// Receiver side of the updates a session produces.
pub type UpdateSink = mpsc::UnboundedSender<SessionUpdate>;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub poll_interval: Duration,
    pub max_polls: u32,
}

impl SessionSettings {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_polls: config.max_polls,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

/// Submits messages and follows their requests to an outcome.
#[derive(Clone)]
pub struct SessionController {
    api: Arc<dyn ExecutionApi>,
    state: Arc<StateStore>,
    settings: SessionSettings,
}

impl SessionController {
    pub fn new(api: Arc<dyn ExecutionApi>, state: Arc<StateStore>, settings: SessionSettings) -> Self {
        Self {
            api,
            state,
            settings,
        }
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    /// Submit `content` on a thread and follow the request until it ends or detaches.
    pub async fn send(
        &self,
        thread_id: &str,
        content: &str,
        sink: &UpdateSink,
    ) -> Result<SessionUpdate, QuillError> {
        let key = uuid::Uuid::new_v4().to_string();
        self.state
            .record_pending(
                thread_id,
                PendingSubmission {
                    idempotency_key: key.clone(),
                    content: content.to_string(),
                },
            )
            .await?;
        self.submit_and_attach(thread_id, &key, content, sink).await
    }

    /// Pick up a thread's in-flight work after a restart.
    ///
    /// A recorded request is checked first: a settled one is replayed from
    /// the event list without opening a stream, a running one is attached
    /// again. Either way delivery continues after the last event already
    /// passed to the caller. A submission without a recorded response is
    /// sent again with its original idempotency key, so the server returns
    /// the same request.
    pub async fn resume(
        &self,
        thread_id: &str,
        sink: &UpdateSink,
    ) -> Result<SessionUpdate, QuillError> {
        let entry = self
            .state
            .thread(thread_id)
            .await
            .ok_or_else(|| QuillError::not_found("session", thread_id))?;

        if let Some(request_id) = entry.request_id {
            info!(thread_id, request_id = %request_id, "resuming recorded request");
            return match self.api.status(&request_id).await {
                Ok(view) if view.status.is_terminal() => {
                    self.replay_settled(thread_id, &request_id, sink).await
                }
                Ok(_) => self.attach(thread_id, &request_id, sink).await,
                Err(e @ QuillError::NotFound { .. }) => {
                    self.state.clear(thread_id).await?;
                    Err(e)
                }
                Err(e) => {
                    debug!(request_id = %request_id, error = %e, "status check failed, attaching anyway");
                    self.attach(thread_id, &request_id, sink).await
                }
            };
        }
        if let Some(pending) = entry.pending {
            info!(thread_id, "re-sending unacknowledged submission");
            return self
                .submit_and_attach(thread_id, &pending.idempotency_key, &pending.content, sink)
                .await;
        }

        self.state.clear(thread_id).await?;
        Err(QuillError::not_found("session", thread_id))
    }

    /// Follow a request: replay, then live events, then polling if the stream drops.
    ///
    /// Events at or below the thread's recorded cursor were already delivered
    /// and are skipped, so a reconnect never repeats a delta.
    pub async fn attach(
        &self,
        thread_id: &str,
        request_id: &str,
        sink: &UpdateSink,
    ) -> Result<SessionUpdate, QuillError> {
        let mut cursor = self.state.cursor(thread_id, request_id).await;
        match self.api.stream(request_id, cursor).await {
            Ok(mut stream) => {
                while let Some(item) = stream.next().await {
                    match item {
                        Ok(event) => {
                            if event.seq <= cursor {
                                continue;
                            }
                            cursor = event.seq;
                            if let Some(outcome) = self.handle_event(event, sink).await? {
                                return self.finish(thread_id, outcome, sink).await;
                            }
                        }
                        Err(e) => {
                            warn!(request_id, error = %e, "event stream dropped");
                            break;
                        }
                    }
                }
                debug!(request_id, cursor, "event stream ended before a terminal event");
            }
            Err(e @ QuillError::NotFound { .. }) => {
                self.state.clear(thread_id).await?;
                return Err(e);
            }
            Err(e) => warn!(request_id, error = %e, "could not open event stream"),
        }

        let outcome = self.poll_outcome(request_id).await?;
        if matches!(outcome, SessionUpdate::Detached { .. }) {
            self.state.record_cursor(thread_id, request_id, cursor).await?;
        }
        self.finish(thread_id, outcome, sink).await
    }

    /// Deliver the undelivered events of a finished request and its outcome.
    async fn replay_settled(
        &self,
        thread_id: &str,
        request_id: &str,
        sink: &UpdateSink,
    ) -> Result<SessionUpdate, QuillError> {
        let cursor = self.state.cursor(thread_id, request_id).await;
        for event in self.api.events(request_id, cursor).await? {
            if event.seq <= cursor {
                continue;
            }
            if let Some(outcome) = self.handle_event(event, sink).await? {
                return self.finish(thread_id, outcome, sink).await;
            }
        }
        // A settled request always ends its log with a terminal event; fall
        // back to the status view if the listing was cut short.
        let outcome = self.poll_outcome(request_id).await?;
        self.finish(thread_id, outcome, sink).await
    }

    pub async fn approve(&self, tool_call_id: &str) -> Result<(), QuillError> {
        self.api.approve(tool_call_id).await.map(|_| ())
    }

    pub async fn reject(&self, tool_call_id: &str, reason: Option<&str>) -> Result<(), QuillError> {
        self.api.reject(tool_call_id, reason).await.map(|_| ())
    }

    async fn submit_and_attach(
        &self,
        thread_id: &str,
        key: &str,
        content: &str,
        sink: &UpdateSink,
    ) -> Result<SessionUpdate, QuillError> {
        let submission = self.api.submit(key, thread_id, content).await?;
        self.state.record_submitted(thread_id, &submission).await?;
        debug!(
            thread_id,
            request_id = %submission.request_id,
            created = submission.created,
            "submission acknowledged"
        );
        emit(
            sink,
            SessionUpdate::Submitted {
                thread_id: thread_id.to_string(),
                request_id: submission.request_id.clone(),
                provisional_message_id: submission.provisional_message_id.clone(),
            },
        );
        self.attach(thread_id, &submission.request_id, sink).await
    }

    /// Emit the update for one event; returns the outcome for terminal events.
    async fn handle_event(
        &self,
        event: ExecutionEvent,
        sink: &UpdateSink,
    ) -> Result<Option<SessionUpdate>, QuillError> {
        let request_id = event.request_id;
        match event.payload {
            EventPayload::ContextReady { .. } => Ok(None),
            EventPayload::TextChunk { text } => {
                emit(sink, SessionUpdate::TextDelta { request_id, text });
                Ok(None)
            }
            EventPayload::ToolCall {
                tool_call_id,
                name,
                input,
                ..
            } => {
                emit(
                    sink,
                    SessionUpdate::ApprovalRequired {
                        request_id,
                        tool_call_id,
                        name,
                        input,
                    },
                );
                Ok(None)
            }
            EventPayload::Completion { message_id, .. } => {
                let message = self.api.message(&message_id).await?;
                Ok(Some(SessionUpdate::Completed {
                    request_id,
                    message,
                }))
            }
            EventPayload::Error { message } => Ok(Some(SessionUpdate::Failed {
                request_id,
                message,
            })),
        }
    }

    /// Poll status until the request settles or the poll budget runs out.
    async fn poll_outcome(&self, request_id: &str) -> Result<SessionUpdate, QuillError> {
        let mut reachable = false;
        for attempt in 0..self.settings.max_polls {
            if attempt > 0 {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
            let view = match self.api.status(request_id).await {
                Ok(view) => view,
                Err(e @ QuillError::NotFound { .. }) => return Err(e),
                Err(e) => {
                    warn!(request_id, attempt, error = %e, "status poll failed");
                    reachable = false;
                    continue;
                }
            };
            reachable = true;
            match view.status {
                RequestStatus::Completed => {
                    let message_id = view.result_message_id.ok_or_else(|| {
                        QuillError::Internal(format!(
                            "request {request_id} completed without a result message"
                        ))
                    })?;
                    let message = self.api.message(&message_id).await?;
                    return Ok(SessionUpdate::Completed {
                        request_id: request_id.to_string(),
                        message,
                    });
                }
                RequestStatus::Failed => {
                    let message = self.failure_message(request_id, view.error).await;
                    return Ok(SessionUpdate::Failed {
                        request_id: request_id.to_string(),
                        message,
                    });
                }
                RequestStatus::Pending | RequestStatus::InProgress => {}
            }
        }
        Ok(SessionUpdate::Detached {
            request_id: request_id.to_string(),
            reconnect: reachable,
        })
    }

    /// The message of the request's error event, falling back to its status error.
    async fn failure_message(&self, request_id: &str, status_error: Option<String>) -> String {
        let from_events = match self.api.events(request_id, 0).await {
            Ok(events) => events.into_iter().rev().find_map(|e| match e.payload {
                EventPayload::Error { message } => Some(message),
                _ => None,
            }),
            Err(e) => {
                warn!(request_id, error = %e, "could not read events of failed request");
                None
            }
        };
        from_events
            .or(status_error)
            .unwrap_or_else(|| "request failed".to_string())
    }

    async fn finish(
        &self,
        thread_id: &str,
        outcome: SessionUpdate,
        sink: &UpdateSink,
    ) -> Result<SessionUpdate, QuillError> {
        match &outcome {
            SessionUpdate::Completed { request_id, .. } | SessionUpdate::Failed { request_id, .. } => {
                info!(thread_id, request_id = %request_id, "session finished");
                self.state.clear(thread_id).await?;
            }
            SessionUpdate::Detached { request_id, reconnect } => {
                info!(thread_id, request_id = %request_id, reconnect, "session detached");
            }
            _ => {}
        }
        emit(sink, outcome.clone());
        Ok(outcome)
    }
}

fn emit(sink: &UpdateSink, update: SessionUpdate) {
    if sink.send(update).is_err() {
        debug!("session update receiver dropped");
    }
}
