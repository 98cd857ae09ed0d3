// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;

use crate::error::QuillError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ApprovalStatus, Checkpoint, ContentBlock, EventPayload, ExecutionEvent, Message,
    MessageStatus, NewSubmission, Request, RequestStatus, RequestUpdate, Submission, ToolCall,
};

/// Adapter for storage and persistence backends.
///
/// Every method that changes request or tool call status is a
/// compare-and-set against the expected current status: exactly one of
/// several concurrent callers succeeds, the rest observe
/// [`QuillError::IllegalTransition`] or [`QuillError::AlreadyDecided`].
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), QuillError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), QuillError>;

    // --- Requests ---

    /// Creates the request and its triggering user message, or returns the
    /// existing request for the same (owner, idempotency key).
    async fn submit(&self, submission: &NewSubmission) -> Result<Submission, QuillError>;

    async fn get_request(&self, id: &str) -> Result<Option<Request>, QuillError>;

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Request>, QuillError>;

    /// Moves a request from `expected` to `next`, applying `update`.
    async fn transition(
        &self,
        id: &str,
        expected: RequestStatus,
        next: RequestStatus,
        update: RequestUpdate,
    ) -> Result<Request, QuillError>;

    /// Atomically removes and returns the checkpoint of an in-progress request.
    ///
    /// Only one caller receives `Some`; this is how a resume is claimed.
    async fn take_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, QuillError>;

    // --- Events ---

    /// Appends a non-terminal event to an in-progress request.
    async fn append_event(
        &self,
        request_id: &str,
        payload: &EventPayload,
    ) -> Result<ExecutionEvent, QuillError>;

    /// Appends a terminal event and moves the request to its terminal
    /// status in one transaction.
    async fn finish_request(
        &self,
        request_id: &str,
        expected: RequestStatus,
        payload: &EventPayload,
        update: RequestUpdate,
    ) -> Result<ExecutionEvent, QuillError>;

    /// Records a pending tool call, its `tool_call` event, and the
    /// checkpoint in one transaction.
    async fn suspend_for_approval(
        &self,
        tool_call: &ToolCall,
        checkpoint: &Checkpoint,
    ) -> Result<ExecutionEvent, QuillError>;

    /// Events with `seq > after_seq`, ascending.
    async fn list_events(
        &self,
        request_id: &str,
        after_seq: i64,
    ) -> Result<Vec<ExecutionEvent>, QuillError>;

    // --- Tool calls ---

    async fn get_tool_call(&self, id: &str) -> Result<Option<ToolCall>, QuillError>;

    async fn list_tool_calls(&self, request_id: &str) -> Result<Vec<ToolCall>, QuillError>;

    /// Moves a pending tool call to `decision`.
    async fn decide_tool_call(
        &self,
        id: &str,
        decision: ApprovalStatus,
        reason: Option<&str>,
    ) -> Result<ToolCall, QuillError>;

    async fn record_tool_output(&self, id: &str, output: &str) -> Result<(), QuillError>;

    /// Pending tool calls created before `cutoff` (an RFC 3339 timestamp).
    async fn list_stale_tool_calls(&self, cutoff: &str) -> Result<Vec<ToolCall>, QuillError>;

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), QuillError>;

    async fn get_message(&self, id: &str) -> Result<Option<Message>, QuillError>;

    async fn update_message(
        &self,
        id: &str,
        blocks: &[ContentBlock],
        status: MessageStatus,
    ) -> Result<(), QuillError>;

    /// Messages of a thread in creation order.
    async fn list_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>, QuillError>;
}
