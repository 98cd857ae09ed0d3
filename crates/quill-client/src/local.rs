// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process transport over a [`Runtime`].

use std::sync::Arc;

use async_trait::async_trait;
use quill_agent::Runtime;
use quill_core::QuillError;
use quill_core::types::{EventStream, ExecutionEvent, Message, StatusView, Submission, ToolCall};

use crate::api::ExecutionApi;

/// Calls the runtime directly on behalf of a fixed user.
#[derive(Clone)]
pub struct LocalApi {
    runtime: Arc<Runtime>,
    owner: String,
}

impl LocalApi {
    pub fn new(runtime: Arc<Runtime>, owner: impl Into<String>) -> Self {
        Self {
            runtime,
            owner: owner.into(),
        }
    }
}

#[async_trait]
impl ExecutionApi for LocalApi {
    async fn submit(
        &self,
        idempotency_key: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<Submission, QuillError> {
        self.runtime
            .submit(&self.owner, idempotency_key, thread_id, content)
            .await
    }

    async fn status(&self, request_id: &str) -> Result<StatusView, QuillError> {
        self.runtime.status(&self.owner, request_id).await
    }

    async fn events(
        &self,
        request_id: &str,
        after_seq: i64,
    ) -> Result<Vec<ExecutionEvent>, QuillError> {
        self.runtime.events(&self.owner, request_id, after_seq).await
    }

    async fn stream(&self, request_id: &str, after_seq: i64) -> Result<EventStream, QuillError> {
        self.runtime.attach(&self.owner, request_id, after_seq).await
    }

    async fn message(&self, message_id: &str) -> Result<Message, QuillError> {
        self.runtime.message(&self.owner, message_id).await
    }

    async fn approve(&self, tool_call_id: &str) -> Result<ToolCall, QuillError> {
        self.runtime.approve(&self.owner, tool_call_id).await
    }

    async fn reject(&self, tool_call_id: &str, reason: Option<&str>) -> Result<ToolCall, QuillError> {
        self.runtime.reject(&self.owner, tool_call_id, reason).await
    }
}
