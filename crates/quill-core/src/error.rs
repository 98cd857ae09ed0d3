// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Quill execution service.

use thiserror::Error;

/// The primary error type used across all Quill adapter traits and core operations.
#[derive(Debug, Error)]
pub enum QuillError {
    /// Malformed input: empty content, missing idempotency key, invalid event payload.
    #[error("validation error: {0}")]
    Validation(String),

    /// A status change or append that the lifecycle state machine does not allow.
    #[error("illegal transition for {entity}: {from} -> {to}")]
    IllegalTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// An approval decision arrived for a tool call that was already decided.
    #[error("tool call {tool_call_id} already decided ({status})")]
    AlreadyDecided { tool_call_id: String, status: String },

    /// The model provider failed. Transient failures are eligible for retry.
    #[error("model error: {message}")]
    UpstreamModel { message: String, transient: bool },

    /// The referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Network transport failures between client and server.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuillError {
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn illegal_transition(
        entity: &str,
        from: impl std::fmt::Display,
        to: impl std::fmt::Display,
    ) -> Self {
        Self::IllegalTransition {
            entity: entity.to_string(),
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    /// Whether a retry of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::UpstreamModel { transient, .. } => *transient,
            Self::Transport { .. } | Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Stable machine-readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::IllegalTransition { .. } => "illegal_transition",
            Self::AlreadyDecided { .. } => "already_decided",
            Self::UpstreamModel { .. } => "upstream_model",
            Self::NotFound { .. } => "not_found",
            Self::Storage { .. } => "storage",
            Self::Config(_) => "config",
            Self::Transport { .. } => "transport",
            Self::Timeout { .. } => "timeout",
            Self::Internal(_) => "internal",
        }
    }
}
