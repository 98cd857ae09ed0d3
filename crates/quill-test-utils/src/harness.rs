// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end execution tests.
//!
//! `TestHarness` assembles a runtime over a temporary SQLite database and a
//! [`MockProvider`], and offers helpers that wait on request progress
//! through the same attach path real clients use.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use quill_agent::{Runtime, RuntimeSettings, Tool, ToolRegistry};
use quill_config::model::StorageConfig;
use quill_core::types::{Submission, ToolCall};
use quill_core::{EventKind, ExecutionEvent, QuillError, StorageAdapter, UsageGate};
use quill_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;

use crate::mock_provider::{MockProvider, MockTurn};

pub const TEST_OWNER: &str = "alice";
pub const TEST_THREAD: &str = "thread-1";

const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    turns: Vec<MockTurn>,
    chunk_delay: Duration,
    tools: Vec<Arc<dyn Tool>>,
    usage_gate: Option<Arc<dyn UsageGate>>,
    settings: RuntimeSettings,
    start: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut settings = RuntimeSettings::default();
        settings.worker.retry_backoff = Duration::from_millis(1);
        settings.sweep_interval = Duration::from_secs(3600);
        settings.shutdown_grace = Duration::from_secs(5);
        Self {
            turns: Vec::new(),
            chunk_delay: Duration::ZERO,
            tools: Vec::new(),
            usage_gate: None,
            settings,
            start: true,
        }
    }

    /// Scripted model turns, played in order.
    pub fn with_turns(mut self, turns: Vec<MockTurn>) -> Self {
        self.turns = turns;
        self
    }

    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_usage_gate(mut self, gate: Arc<dyn UsageGate>) -> Self {
        self.usage_gate = Some(gate);
        self
    }

    /// Adjust runtime settings before the runtime is built.
    pub fn with_settings(mut self, adjust: impl FnOnce(&mut RuntimeSettings)) -> Self {
        adjust(&mut self.settings);
        self
    }

    /// Build without starting the job loop, so recovery can be exercised.
    pub fn stopped(mut self) -> Self {
        self.start = false;
        self
    }

    pub async fn build(self) -> Result<TestHarness, QuillError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| QuillError::Storage { source: e.into() })?;
        let database_path = temp_dir.path().join("test.db").to_string_lossy().into_owned();

        let storage = SqliteStorage::new(StorageConfig {
            database_path,
            wal_mode: true,
        });
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        let provider =
            Arc::new(MockProvider::with_turns(self.turns).with_chunk_delay(self.chunk_delay));

        let mut registry = ToolRegistry::new();
        for tool in self.tools {
            registry.register(tool);
        }

        let runtime = match self.usage_gate {
            Some(gate) => Runtime::with_usage_gate(
                storage.clone(),
                provider.clone(),
                registry,
                gate,
                self.settings,
            ),
            None => Runtime::new(storage.clone(), provider.clone(), registry, self.settings),
        };

        let cancel = CancellationToken::new();
        if self.start {
            runtime.start(cancel.clone());
        }

        Ok(TestHarness {
            runtime,
            provider,
            storage,
            cancel,
            _temp_dir: temp_dir,
        })
    }
}

/// A running execution stack backed by a temporary database.
pub struct TestHarness {
    pub runtime: Arc<Runtime>,
    pub provider: Arc<MockProvider>,
    pub storage: Arc<dyn StorageAdapter>,
    pub cancel: CancellationToken,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Starts the job loop of a harness built with [`TestHarnessBuilder::stopped`].
    pub fn start(&self) {
        self.runtime.start(self.cancel.clone());
    }

    /// Submit `content` as the test owner on the test thread, with a fresh key.
    pub async fn submit(&self, content: &str) -> Result<Submission, QuillError> {
        let key = uuid::Uuid::new_v4().to_string();
        self.runtime
            .submit(TEST_OWNER, &key, TEST_THREAD, content)
            .await
    }

    /// Every event of the request, waiting until it is terminal.
    pub async fn wait_for_terminal(&self, request_id: &str) -> Result<Vec<ExecutionEvent>, QuillError> {
        let stream = self.runtime.attach(TEST_OWNER, request_id, 0).await?;
        let collect = stream.collect::<Vec<_>>();
        let items = tokio::time::timeout(WAIT_TIMEOUT, collect)
            .await
            .map_err(|_| QuillError::Timeout {
                duration: WAIT_TIMEOUT,
            })?;
        items.into_iter().collect()
    }

    /// The first event of `kind`, waiting for it to be appended.
    pub async fn wait_for_event(
        &self,
        request_id: &str,
        kind: EventKind,
    ) -> Result<ExecutionEvent, QuillError> {
        let mut stream = self.runtime.attach(TEST_OWNER, request_id, 0).await?;
        let find = async {
            while let Some(event) = stream.next().await {
                let event = event?;
                if event.payload.kind() == kind {
                    return Ok(event);
                }
            }
            Err(QuillError::Internal(format!(
                "request {request_id} ended without a {kind} event"
            )))
        };
        tokio::time::timeout(WAIT_TIMEOUT, find)
            .await
            .map_err(|_| QuillError::Timeout {
                duration: WAIT_TIMEOUT,
            })?
    }

    /// The tool call the request is paused on, waiting for it to appear.
    pub async fn wait_for_tool_call(&self, request_id: &str) -> Result<ToolCall, QuillError> {
        let event = self.wait_for_event(request_id, EventKind::ToolCall).await?;
        let quill_core::EventPayload::ToolCall { tool_call_id, .. } = event.payload else {
            return Err(QuillError::Internal("tool_call event without id".into()));
        };
        self.storage
            .get_tool_call(&tool_call_id)
            .await?
            .ok_or_else(|| QuillError::not_found("tool call", &tool_call_id))
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
