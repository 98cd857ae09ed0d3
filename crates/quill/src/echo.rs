// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Development model provider.
//!
//! Streams the user's text back word by word. A message of the form
//! `/tool <name> <json>` becomes a tool request, and a tool result is
//! summarized once execution resumes.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use quill_core::types::{
    AdapterType, ContentBlock, HealthStatus, MessageRole, ModelChunk, ModelMessage, ModelRequest,
    ModelStream, TokenUsage, new_id,
};
use quill_core::{PluginAdapter, ProviderAdapter, QuillError};

const TOOL_PREFIX: &str = "/tool ";

/// A provider that answers without any model behind it.
pub struct EchoProvider {
    chunk_delay: Duration,
}

impl EchoProvider {
    pub fn new(chunk_delay: Duration) -> Self {
        Self { chunk_delay }
    }
}

fn user_text(message: &ModelMessage) -> String {
    message
        .blocks
        .iter()
        .filter_map(|b| match b {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

fn words(text: &str) -> Vec<ModelChunk> {
    text.split_inclusive(' ')
        .map(|w| ModelChunk::TextDelta(w.to_string()))
        .collect()
}

/// The chunks answering `request`, without usage or stop markers.
fn reply(request: &ModelRequest) -> Vec<ModelChunk> {
    let Some(last) = request.messages.last() else {
        return words("Nothing to echo.");
    };
    if last.role != MessageRole::User {
        return words("Nothing to echo.");
    }

    let tool_result = last.blocks.iter().find_map(|b| match b {
        ContentBlock::ToolResult {
            content, is_error, ..
        } => Some((content.as_str(), *is_error)),
        _ => None,
    });
    if let Some((content, is_error)) = tool_result {
        let summary = if is_error {
            format!("The tool did not run: {content}")
        } else {
            format!("Done: {content}")
        };
        return words(&summary);
    }

    let text = user_text(last);
    let Some(command) = text.trim().strip_prefix(TOOL_PREFIX) else {
        return words(&format!("You said: {}", text.trim()));
    };

    let (name, raw_input) = match command.trim().split_once(' ') {
        Some((name, rest)) => (name, rest.trim()),
        None => (command.trim(), ""),
    };
    let input = if raw_input.is_empty() {
        Ok(serde_json::json!({}))
    } else {
        serde_json::from_str::<serde_json::Value>(raw_input)
    };
    match input {
        Ok(input) => vec![
            ModelChunk::TextDelta(format!("Requesting `{name}`. ")),
            ModelChunk::ToolUse {
                id: format!("call_{}", new_id()),
                name: name.to_string(),
                input,
            },
        ],
        Err(e) => words(&format!("Could not parse the input for `{name}`: {e}")),
    }
}

#[async_trait]
impl PluginAdapter for EchoProvider {
    fn name(&self) -> &str {
        "echo"
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
impl ProviderAdapter for EchoProvider {
    async fn stream(&self, request: ModelRequest) -> Result<ModelStream, QuillError> {
        let mut chunks = reply(&request);
        let wants_tool = chunks
            .iter()
            .any(|c| matches!(c, ModelChunk::ToolUse { .. }));

        let input_tokens = request
            .messages
            .iter()
            .map(|m| user_text(m).split_whitespace().count())
            .sum::<usize>();
        let output_tokens = chunks
            .iter()
            .filter(|c| matches!(c, ModelChunk::TextDelta(_)))
            .count();
        chunks.push(ModelChunk::Usage(TokenUsage {
            input_tokens: u32::try_from(input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(output_tokens).unwrap_or(u32::MAX),
        }));
        chunks.push(ModelChunk::Stop {
            reason: Some(if wants_tool { "tool_use" } else { "end_turn" }.to_string()),
        });

        let delay = self.chunk_delay;
        Ok(Box::pin(stream::iter(chunks).then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(chunk)
        })))
    }
}
