// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Provider adapter trait for streaming language model backends.

use async_trait::async_trait;

use crate::error::QuillError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ModelRequest, ModelStream};

/// Adapter for language model providers.
///
/// Errors carry a `transient` flag through [`QuillError::UpstreamModel`];
/// the execution worker retries transient failures that occur before any
/// output was produced.
#[async_trait]
pub trait ProviderAdapter: PluginAdapter {
    /// Sends a request and returns a stream of response chunks.
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, QuillError>;
}
