// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport seam between the session controller and an execution service.

use async_trait::async_trait;
use quill_core::QuillError;
use quill_core::types::{EventStream, ExecutionEvent, Message, StatusView, Submission, ToolCall};

/// Operations a client performs against an execution service, as one user.
#[async_trait]
pub trait ExecutionApi: Send + Sync {
    /// Submit a message. A repeated `idempotency_key` returns the original request.
    async fn submit(
        &self,
        idempotency_key: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<Submission, QuillError>;

    async fn status(&self, request_id: &str) -> Result<StatusView, QuillError>;

    /// Stored events with `seq > after_seq`.
    async fn events(&self, request_id: &str, after_seq: i64)
    -> Result<Vec<ExecutionEvent>, QuillError>;

    /// Replay from `after_seq` followed by live events, ending after the terminal event.
    async fn stream(&self, request_id: &str, after_seq: i64) -> Result<EventStream, QuillError>;

    async fn message(&self, message_id: &str) -> Result<Message, QuillError>;

    async fn approve(&self, tool_call_id: &str) -> Result<ToolCall, QuillError>;

    async fn reject(&self, tool_call_id: &str, reason: Option<&str>)
    -> Result<ToolCall, QuillError>;
}
