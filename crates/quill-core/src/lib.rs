// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Quill execution service.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Quill workspace: the request lifecycle,
//! execution events, tool calls, and messages.

pub mod api;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::QuillError;
pub use types::{
    AdapterType, ApprovalStatus, EventKind, EventPayload, ExecutionEvent, HealthStatus,
    RequestStatus,
};

pub use traits::{PluginAdapter, ProviderAdapter, StorageAdapter, UsageGate};
