// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool trait and registry.
//!
//! Tools only run after an explicit approval. The [`ToolRegistry`] resolves
//! an approved call by name and advertises every registered tool to the
//! model as a [`ToolDefinition`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use quill_core::QuillError;
use quill_core::types::ToolDefinition;
use serde::{Deserialize, Serialize};

/// Output from a tool invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Text handed back to the model as the tool result.
    pub content: String,
    /// Whether the tool reported a failure.
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// A side-effecting action the model may request.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name the model uses to call the tool.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the tool input.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Runs the tool. Only called for approved tool calls.
    async fn invoke(&self, input: serde_json::Value) -> Result<ToolOutput, QuillError>;
}

/// Registry of available tools, indexed by name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool under its `name()`, replacing any previous one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions for every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.parameters_schema(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoteTool;

    #[async_trait]
    impl Tool for NoteTool {
        fn name(&self) -> &str {
            "write_note"
        }

        fn description(&self) -> &str {
            "Stores a note"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }

        async fn invoke(&self, input: serde_json::Value) -> Result<ToolOutput, QuillError> {
            match input["text"].as_str() {
                Some(text) => Ok(ToolOutput::ok(format!("stored {} bytes", text.len()))),
                None => Ok(ToolOutput::error("missing text")),
            }
        }
    }

    struct ClockTool;

    #[async_trait]
    impl Tool for ClockTool {
        fn name(&self) -> &str {
            "clock"
        }

        fn description(&self) -> &str {
            "Reads the clock"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object" })
        }

        async fn invoke(&self, _input: serde_json::Value) -> Result<ToolOutput, QuillError> {
            Ok(ToolOutput::ok("noon"))
        }
    }

    #[test]
    fn registers_and_looks_up_by_name() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());
        registry.register(Arc::new(NoteTool));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("write_note").unwrap().name(), "write_note");
        assert!(registry.get("rm_rf").is_none());
    }

    #[test]
    fn definitions_are_sorted_and_carry_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NoteTool));
        registry.register(Arc::new(ClockTool));

        let defs = registry.definitions();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["clock", "write_note"]);
        assert_eq!(defs[1].input_schema["required"][0], "text");
    }

    #[tokio::test]
    async fn invocation_reports_tool_errors_as_output() {
        let tool = NoteTool;
        let out = tool.invoke(serde_json::json!({})).await.unwrap();
        assert!(out.is_error);
        let out = tool.invoke(serde_json::json!({"text": "hey"})).await.unwrap();
        assert_eq!(out, ToolOutput::ok("stored 3 bytes"));
    }
}
