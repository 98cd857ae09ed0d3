// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across Quill crates.
//!
//! Row types mirror the persisted entities (requests, events, tool calls,
//! messages). Status fields are strongly typed enums; their string form is
//! what lands in SQLite and on the wire.

use std::pin::Pin;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

use crate::error::QuillError;

/// Health status reported by an adapter's health check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter in the plugin registry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Provider,
    Storage,
}

/// Namespace for deriving request IDs from (owner, idempotency key).
const REQUEST_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2b7e_9a44_4d0b_8c55_3e2f_a1d0_9b17);

/// Derive the stable request ID for an owner's idempotency key.
///
/// Retried submissions with the same key resolve to the same request.
pub fn request_id_for(owner: &str, idempotency_key: &str) -> String {
    let name = format!("{owner}\n{idempotency_key}");
    Uuid::new_v5(&REQUEST_NAMESPACE, name.as_bytes()).to_string()
}

/// Generate a fresh random identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Current UTC time in the fixed-width RFC 3339 form used for every stored timestamp.
///
/// The fixed width keeps lexicographic and chronological order identical.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// --- Request lifecycle ---

/// Lifecycle status of a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// `InProgress -> InProgress` is allowed for progress and checkpoint updates.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Failed)
                | (Self::InProgress, Self::InProgress)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

/// Token counts reported by the model provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// Conversation state captured when execution pauses for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Assistant text produced so far for the pending message.
    pub accumulated_text: String,
    /// Model-facing transcript, including the assistant turn that requested the tool.
    pub transcript: Vec<ModelMessage>,
    /// The tool call execution is waiting on.
    pub pending_tool_call_id: String,
    pub usage: TokenUsage,
    /// Number of completed tool rounds.
    pub round: u32,
}

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub owner: String,
    pub idempotency_key: String,
    pub thread_id: String,
    pub triggering_message_id: String,
    /// Reserved at submission; the assistant message produced by this request.
    pub assistant_message_id: String,
    pub status: RequestStatus,
    pub progress: f64,
    pub result_message_id: Option<String>,
    pub error: Option<String>,
    pub checkpoint: Option<Checkpoint>,
    pub usage: TokenUsage,
    pub created_at: String,
    pub updated_at: String,
}

impl Request {
    pub fn status_view(&self) -> StatusView {
        StatusView {
            request_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            result_message_id: self.result_message_id.clone(),
            error: self.error.clone(),
        }
    }
}

/// Client-visible summary of a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub request_id: String,
    pub status: RequestStatus,
    pub progress: f64,
    pub result_message_id: Option<String>,
    pub error: Option<String>,
}

/// Input to a submission.
#[derive(Debug, Clone)]
pub struct NewSubmission {
    pub owner: String,
    pub idempotency_key: String,
    pub thread_id: String,
    pub content: String,
}

/// Result of a submission. `created` is false when the key was already known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub request_id: String,
    pub provisional_message_id: String,
    pub triggering_message_id: String,
    pub created: bool,
}

/// How a transition treats the stored checkpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CheckpointChange {
    #[default]
    Keep,
    Set(Box<Checkpoint>),
    Clear,
}

/// Field updates applied together with a status transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestUpdate {
    /// Progress never decreases; lower values are ignored.
    pub progress: Option<f64>,
    pub checkpoint: CheckpointChange,
    pub result_message_id: Option<String>,
    pub error: Option<String>,
    pub usage: Option<TokenUsage>,
}

impl RequestUpdate {
    pub fn progress(value: f64) -> Self {
        Self {
            progress: Some(value),
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            checkpoint: CheckpointChange::Clear,
            ..Self::default()
        }
    }
}

// --- Execution events ---

/// Discriminant of an event payload, as stored in the `kind` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ContextReady,
    TextChunk,
    ToolCall,
    Completion,
    Error,
}

impl EventKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completion | Self::Error)
    }
}

/// Typed payload of an execution event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    ContextReady {
        message_count: usize,
    },
    TextChunk {
        text: String,
    },
    ToolCall {
        tool_call_id: String,
        name: String,
        input: serde_json::Value,
        message_id: String,
    },
    Completion {
        message_id: String,
        usage: TokenUsage,
    },
    Error {
        message: String,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ContextReady { .. } => EventKind::ContextReady,
            Self::TextChunk { .. } => EventKind::TextChunk,
            Self::ToolCall { .. } => EventKind::ToolCall,
            Self::Completion { .. } => EventKind::Completion,
            Self::Error { .. } => EventKind::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.kind().is_terminal()
    }

    /// Rejects payloads that would be meaningless to a consumer.
    pub fn validate(&self) -> Result<(), QuillError> {
        let problem = match self {
            Self::TextChunk { text } if text.is_empty() => Some("text_chunk requires text"),
            Self::ToolCall {
                tool_call_id, name, ..
            } if tool_call_id.is_empty() || name.is_empty() => {
                Some("tool_call requires an id and a name")
            }
            Self::Completion { message_id, .. } if message_id.is_empty() => {
                Some("completion requires a message id")
            }
            Self::Error { message } if message.is_empty() => Some("error requires a message"),
            _ => None,
        };
        match problem {
            Some(p) => Err(QuillError::Validation(p.to_string())),
            None => Ok(()),
        }
    }

    /// The request status a terminal payload settles on.
    pub fn terminal_status(&self) -> Option<RequestStatus> {
        match self {
            Self::Completion { .. } => Some(RequestStatus::Completed),
            Self::Error { .. } => Some(RequestStatus::Failed),
            _ => None,
        }
    }
}

/// An immutable, ordered record of something that happened during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub request_id: String,
    /// Strictly increasing per request, starting at 1.
    pub seq: i64,
    pub created_at: String,
    pub payload: EventPayload,
}

/// A live or replayed sequence of execution events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<ExecutionEvent, QuillError>> + Send>>;

// --- Tool calls ---

/// Approval status of a tool call.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Timeout,
}

impl ApprovalStatus {
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A model-requested tool invocation gated on user approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub request_id: String,
    pub message_id: String,
    pub name: String,
    pub input: serde_json::Value,
    pub status: ApprovalStatus,
    pub reason: Option<String>,
    pub output: Option<String>,
    /// Incremented on every change; used for optimistic concurrency.
    pub revision: i64,
    pub created_at: String,
    pub decided_at: Option<String>,
}

// --- Messages ---

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Streaming,
    Complete,
    /// The request failed; blocks hold whatever was produced before.
    Failed,
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// A persisted conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub thread_id: String,
    pub request_id: Option<String>,
    pub role: MessageRole,
    pub status: MessageStatus,
    pub blocks: Vec<ContentBlock>,
    pub created_at: String,
    pub updated_at: String,
}

impl Message {
    /// Concatenated text of all text blocks.
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

// --- Provider types ---

/// A message as presented to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMessage {
    pub role: MessageRole,
    pub blocks: Vec<ContentBlock>,
}

/// A tool the model may request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Request sent to a model provider.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub system_prompt: Option<String>,
    pub messages: Vec<ModelMessage>,
    pub max_tokens: u32,
    pub tools: Vec<ToolDefinition>,
}

/// One item of a streamed model response.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    TextDelta(String),
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    Usage(TokenUsage),
    Stop { reason: Option<String> },
}

/// A streamed model response.
pub type ModelStream = Pin<Box<dyn Stream<Item = Result<ModelChunk, QuillError>> + Send>>;
