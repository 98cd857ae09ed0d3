// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock model provider for deterministic testing.
//!
//! `MockProvider` implements `ProviderAdapter` by popping scripted turns
//! from a FIFO queue. When the queue is empty it answers "mock response".

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use quill_core::traits::{PluginAdapter, ProviderAdapter};
use quill_core::types::{AdapterType, HealthStatus, ModelChunk, ModelRequest, ModelStream, TokenUsage};
use quill_core::QuillError;
use tokio::sync::Mutex;

/// One scripted model call.
#[derive(Debug, Clone)]
pub enum MockTurn {
    /// Streams the chunks, then stops.
    Text(Vec<String>),
    /// Streams the chunks, then requests a tool.
    ToolUse {
        text: Vec<String>,
        id: String,
        name: String,
        input: serde_json::Value,
    },
    /// Fails before producing anything.
    Fail { transient: bool },
    /// Streams the chunks, then fails.
    FailAfter { text: Vec<String>, transient: bool },
}

impl MockTurn {
    pub fn text(chunks: &[&str]) -> Self {
        Self::Text(chunks.iter().map(|c| c.to_string()).collect())
    }

    pub fn tool(id: &str, name: &str, input: serde_json::Value) -> Self {
        Self::ToolUse {
            text: Vec::new(),
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    pub fn transient_failure() -> Self {
        Self::Fail { transient: true }
    }

    pub fn fatal_failure() -> Self {
        Self::Fail { transient: false }
    }
}

const TURN_USAGE: TokenUsage = TokenUsage {
    input_tokens: 10,
    output_tokens: 20,
};

fn upstream_error(transient: bool) -> QuillError {
    QuillError::UpstreamModel {
        message: if transient {
            "mock overloaded".into()
        } else {
            "mock rejected the prompt".into()
        },
        transient,
    }
}

/// A model provider that plays back scripted turns.
pub struct MockProvider {
    turns: Arc<Mutex<VecDeque<MockTurn>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
    chunk_delay: Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_turns(Vec::new())
    }

    pub fn with_turns(turns: Vec<MockTurn>) -> Self {
        Self {
            turns: Arc::new(Mutex::new(VecDeque::from(turns))),
            requests: Arc::new(Mutex::new(Vec::new())),
            chunk_delay: Duration::ZERO,
        }
    }

    /// Sleep before every streamed chunk.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub async fn push_turn(&self, turn: MockTurn) {
        self.turns.lock().await.push_back(turn);
    }

    /// Every request received so far, in order.
    pub async fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    async fn next_turn(&self) -> MockTurn {
        self.turns
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| MockTurn::text(&["mock response"]))
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, QuillError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, QuillError> {
        self.requests.lock().await.push(request);

        let text_chunks = |text: Vec<String>| -> Vec<Result<ModelChunk, QuillError>> {
            text.into_iter().map(|t| Ok(ModelChunk::TextDelta(t))).collect()
        };
        let chunks = match self.next_turn().await {
            MockTurn::Fail { transient } => return Err(upstream_error(transient)),
            MockTurn::Text(text) => {
                let mut chunks = text_chunks(text);
                chunks.push(Ok(ModelChunk::Usage(TURN_USAGE)));
                chunks.push(Ok(ModelChunk::Stop {
                    reason: Some("end_turn".into()),
                }));
                chunks
            }
            MockTurn::ToolUse {
                text,
                id,
                name,
                input,
            } => {
                let mut chunks = text_chunks(text);
                chunks.push(Ok(ModelChunk::ToolUse { id, name, input }));
                chunks.push(Ok(ModelChunk::Usage(TURN_USAGE)));
                chunks.push(Ok(ModelChunk::Stop {
                    reason: Some("tool_use".into()),
                }));
                chunks
            }
            MockTurn::FailAfter { text, transient } => {
                let mut chunks = text_chunks(text);
                chunks.push(Err(upstream_error(transient)));
                chunks
            }
        };

        let delay = self.chunk_delay;
        Ok(Box::pin(stream::iter(chunks).then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            chunk
        })))
    }
}
