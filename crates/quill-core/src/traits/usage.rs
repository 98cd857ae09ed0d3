// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;

use crate::error::QuillError;

/// Admission check run before a request starts executing.
///
/// Returning an error fails the request with that error's message.
#[async_trait]
pub trait UsageGate: Send + Sync + 'static {
    async fn check(&self, owner: &str) -> Result<(), QuillError>;
}
