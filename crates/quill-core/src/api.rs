// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP wire types shared by the gateway and its clients.

use serde::{Deserialize, Serialize};

/// Header carrying the client-chosen idempotency key on submission.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// SSE event name used when an event stream fails before its terminal event.
pub const STREAM_ERROR_EVENT: &str = "stream_error";

/// Body of `POST /v1/requests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitBody {
    pub thread_id: String,
    pub content: String,
}

/// Response of `POST /v1/requests`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub request_id: String,
    pub provisional_message_id: String,
    pub triggering_message_id: String,
    /// False when the key matched an earlier submission.
    pub created: bool,
}

/// Body of `POST /v1/tool-calls/{id}/reject`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Error body returned for every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Stable machine-readable code, see `QuillError::code`.
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}
