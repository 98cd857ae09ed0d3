// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP gateway for the Quill execution service.
//!
//! Exposes submission, status, event replay, live SSE streaming, message
//! reads, and approval decisions over axum. Every `/v1` route requires a
//! bearer token that maps to a user; requests are scoped to that user.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;
pub mod sse;

pub use auth::{AuthConfig, CallerIdentity};
pub use error::ApiError;
pub use server::{GatewayState, bind, router, serve};
