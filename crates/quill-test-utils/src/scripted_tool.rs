// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool with a fixed result that records every invocation.

use std::sync::Arc;

use async_trait::async_trait;
use quill_agent::{Tool, ToolOutput};
use quill_core::QuillError;
use tokio::sync::Mutex;

pub struct ScriptedTool {
    name: String,
    result: Result<ToolOutput, String>,
    invocations: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl ScriptedTool {
    /// A tool that always succeeds with `output`.
    pub fn new(name: &str, output: &str) -> Self {
        Self {
            name: name.into(),
            result: Ok(ToolOutput::ok(output)),
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// A tool whose invocation always returns an error.
    pub fn failing(name: &str, message: &str) -> Self {
        Self {
            name: name.into(),
            result: Err(message.into()),
            invocations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Inputs the tool was invoked with.
    pub async fn invocations(&self) -> Vec<serde_json::Value> {
        self.invocations.lock().await.clone()
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Scripted test tool"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<ToolOutput, QuillError> {
        self.invocations.lock().await.push(input);
        self.result.clone().map_err(QuillError::Internal)
    }
}
