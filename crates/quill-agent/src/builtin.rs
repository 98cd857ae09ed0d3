// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in tools, available without any configuration.

use std::sync::Arc;

use async_trait::async_trait;
use quill_core::QuillError;

use crate::tools::{Tool, ToolOutput, ToolRegistry};

/// Writes text to a file, creating parent directories as needed.
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write text content to a file on the server"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn invoke(&self, input: serde_json::Value) -> Result<ToolOutput, QuillError> {
        let Some(path) = input["path"].as_str().filter(|p| !p.trim().is_empty()) else {
            return Ok(ToolOutput::error("missing required 'path' parameter"));
        };
        let Some(content) = input["content"].as_str() else {
            return Ok(ToolOutput::error("missing required 'content' parameter"));
        };

        let path = std::path::Path::new(path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = tokio::fs::create_dir_all(parent).await {
                    return Ok(ToolOutput::error(format!(
                        "failed to create {}: {e}",
                        parent.display()
                    )));
                }
            }
        }
        match tokio::fs::write(path, content).await {
            Ok(()) => Ok(ToolOutput::ok(format!(
                "wrote {} bytes to {}",
                content.len(),
                path.display()
            ))),
            Err(e) => Ok(ToolOutput::error(format!(
                "failed to write {}: {e}",
                path.display()
            ))),
        }
    }
}

/// Registers all built-in tools into the given registry.
pub fn register_builtins(registry: &mut ToolRegistry) {
    registry.register(Arc::new(WriteFileTool));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_builtins_registers_write_file() {
        let mut registry = ToolRegistry::new();
        register_builtins(&mut registry);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("write_file").is_some());
    }

    #[tokio::test]
    async fn writes_content_into_nested_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes").join("a.txt");
        let output = WriteFileTool
            .invoke(serde_json::json!({
                "path": path.to_str().unwrap(),
                "content": "hello",
            }))
            .await
            .unwrap();
        assert!(!output.is_error, "{}", output.content);
        assert!(output.content.starts_with("wrote 5 bytes"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello");
    }

    #[tokio::test]
    async fn missing_parameters_are_tool_errors() {
        let output = WriteFileTool
            .invoke(serde_json::json!({"content": "x"}))
            .await
            .unwrap();
        assert!(output.is_error);
        let output = WriteFileTool
            .invoke(serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert!(output.is_error);
    }
}
