// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution worker: drives a request through the model.
//!
//! A run claims a pending request, builds the conversation context, and
//! streams model output into the event log. When the model asks for a
//! tool, the worker persists a checkpoint and stops; a later resume picks
//! the checkpoint up once the tool call is decided. Every exit path leaves
//! the request either paused on a pending tool call or terminal.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use quill_config::QuillConfig;
use quill_core::types::{
    Checkpoint, CheckpointChange, ContentBlock, Message, MessageRole, MessageStatus, ModelChunk,
    ModelMessage, ModelRequest, Request, RequestUpdate, TokenUsage, ToolCall, now_timestamp,
};
use quill_core::{
    ApprovalStatus, EventPayload, ProviderAdapter, QuillError, RequestStatus, StorageAdapter,
    UsageGate,
};
use tracing::{debug, error, info, warn};

use crate::context::build_transcript;
use crate::event_log::EventLog;
use crate::tools::ToolRegistry;

const CLAIMED_PROGRESS: f64 = 0.05;
const CONTEXT_PROGRESS: f64 = 0.1;

/// Model and retry settings for a worker.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub model: String,
    pub max_tokens: u32,
    pub system_prompt: Option<String>,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub max_tool_rounds: u32,
}

impl WorkerSettings {
    pub fn from_config(config: &QuillConfig) -> Self {
        Self {
            model: config.model.model.clone(),
            max_tokens: config.model.max_tokens,
            system_prompt: config.model.system_prompt.clone(),
            max_retries: config.worker.max_retries,
            retry_backoff: Duration::from_millis(config.worker.retry_backoff_ms),
            max_tool_rounds: config.worker.max_tool_rounds,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&QuillConfig::default())
    }
}

/// How a worker invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutcome {
    Completed { message_id: String },
    /// Paused until the tool call is decided.
    Suspended { tool_call_id: String },
    Failed { message: String },
    /// Nothing to do: already claimed, finished, or still awaiting a decision.
    Skipped,
}

/// Generation state carried across model turns.
struct Turn {
    transcript: Vec<ModelMessage>,
    /// Content of the assistant message being produced.
    blocks: Vec<ContentBlock>,
    accumulated_text: String,
    usage: TokenUsage,
    round: u32,
}

enum TurnEnd {
    Finished,
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
}

struct StreamFailure {
    error: QuillError,
    produced_output: bool,
    /// Text of this call already in the log.
    partial: String,
}

impl StreamFailure {
    fn before_output(error: QuillError) -> Self {
        Self {
            error,
            produced_output: false,
            partial: String::new(),
        }
    }

    fn after_output(error: QuillError, partial: String) -> Self {
        Self {
            error,
            produced_output: true,
            partial,
        }
    }
}

/// Executes requests against a model provider.
pub struct ExecutionWorker {
    storage: Arc<dyn StorageAdapter>,
    provider: Arc<dyn ProviderAdapter>,
    tools: Arc<ToolRegistry>,
    usage_gate: Arc<dyn UsageGate>,
    log: EventLog,
    settings: WorkerSettings,
}

impl ExecutionWorker {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        tools: Arc<ToolRegistry>,
        usage_gate: Arc<dyn UsageGate>,
        log: EventLog,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            storage,
            provider,
            tools,
            usage_gate,
            log,
            settings,
        }
    }

    /// Starts a pending request.
    pub async fn run(&self, request_id: &str) -> WorkerOutcome {
        match self.start(request_id).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail(request_id, e).await,
        }
    }

    /// Continues a request whose pending tool call has been decided.
    pub async fn resume(&self, request_id: &str) -> WorkerOutcome {
        match self.continue_after_decision(request_id).await {
            Ok(outcome) => outcome,
            Err(e) => self.fail(request_id, e).await,
        }
    }

    async fn load(&self, request_id: &str) -> Result<Request, QuillError> {
        self.storage
            .get_request(request_id)
            .await?
            .ok_or_else(|| QuillError::not_found("request", request_id))
    }

    async fn start(&self, request_id: &str) -> Result<WorkerOutcome, QuillError> {
        let request = self.load(request_id).await?;
        if request.status != RequestStatus::Pending {
            debug!(request_id, status = %request.status, "request is not pending, skipping run");
            return Ok(WorkerOutcome::Skipped);
        }

        // Denial fails the request straight from pending.
        self.usage_gate.check(&request.owner).await?;

        match self
            .storage
            .transition(
                request_id,
                RequestStatus::Pending,
                RequestStatus::InProgress,
                RequestUpdate::progress(CLAIMED_PROGRESS),
            )
            .await
        {
            Ok(_) => {}
            Err(QuillError::IllegalTransition { .. }) => {
                debug!(request_id, "request claimed by another worker");
                return Ok(WorkerOutcome::Skipped);
            }
            Err(e) => return Err(e),
        }
        info!(request_id, owner = %request.owner, "request claimed");

        let now = now_timestamp();
        self.storage
            .insert_message(&Message {
                id: request.assistant_message_id.clone(),
                thread_id: request.thread_id.clone(),
                request_id: Some(request.id.clone()),
                role: MessageRole::Assistant,
                status: MessageStatus::Streaming,
                blocks: Vec::new(),
                created_at: now.clone(),
                updated_at: now,
            })
            .await?;

        let history = self.storage.list_thread_messages(&request.thread_id).await?;
        let transcript = build_transcript(&history, &request.assistant_message_id);
        self.log
            .append(
                request_id,
                EventPayload::ContextReady {
                    message_count: transcript.len(),
                },
            )
            .await?;
        self.storage
            .transition(
                request_id,
                RequestStatus::InProgress,
                RequestStatus::InProgress,
                RequestUpdate::progress(CONTEXT_PROGRESS),
            )
            .await?;

        let turn = Turn {
            transcript,
            blocks: Vec::new(),
            accumulated_text: String::new(),
            usage: TokenUsage::default(),
            round: 0,
        };
        self.generate(&request, turn).await
    }

    async fn continue_after_decision(&self, request_id: &str) -> Result<WorkerOutcome, QuillError> {
        let request = self.load(request_id).await?;
        if request.status != RequestStatus::InProgress {
            debug!(request_id, status = %request.status, "request is not in progress, skipping resume");
            return Ok(WorkerOutcome::Skipped);
        }
        let Some(pending_id) = request
            .checkpoint
            .as_ref()
            .map(|c| c.pending_tool_call_id.clone())
        else {
            debug!(request_id, "no checkpoint, resume already claimed");
            return Ok(WorkerOutcome::Skipped);
        };

        let tool_call = self
            .storage
            .get_tool_call(&pending_id)
            .await?
            .ok_or_else(|| QuillError::not_found("tool call", &pending_id))?;
        if !tool_call.status.is_decided() {
            debug!(request_id, tool_call_id = %pending_id, "tool call still awaiting a decision");
            return Ok(WorkerOutcome::Skipped);
        }

        let Some(checkpoint) = self.storage.take_checkpoint(request_id).await? else {
            debug!(request_id, "resume claimed by another worker");
            return Ok(WorkerOutcome::Skipped);
        };
        info!(request_id, tool_call_id = %tool_call.id, decision = %tool_call.status, "resuming request");

        let message = self
            .storage
            .get_message(&request.assistant_message_id)
            .await?
            .ok_or_else(|| QuillError::not_found("message", &request.assistant_message_id))?;

        let result = self.tool_result(&tool_call).await?;
        let mut blocks = message.blocks;
        blocks.push(result.clone());
        self.storage
            .update_message(&message.id, &blocks, MessageStatus::Streaming)
            .await?;

        let mut transcript = checkpoint.transcript;
        transcript.push(ModelMessage {
            role: MessageRole::User,
            blocks: vec![result],
        });
        let round = checkpoint.round + 1;
        let progress = (CONTEXT_PROGRESS + 0.1 * f64::from(round)).min(0.9);
        self.storage
            .transition(
                request_id,
                RequestStatus::InProgress,
                RequestStatus::InProgress,
                RequestUpdate::progress(progress),
            )
            .await?;

        let turn = Turn {
            transcript,
            blocks,
            accumulated_text: checkpoint.accumulated_text,
            usage: checkpoint.usage,
            round,
        };
        self.generate(&request, turn).await
    }

    /// Result block handed back to the model for a decided tool call.
    async fn tool_result(&self, call: &ToolCall) -> Result<ContentBlock, QuillError> {
        let (content, is_error) = match call.status {
            ApprovalStatus::Approved => {
                let (content, is_error) = match self.tools.get(&call.name) {
                    Some(tool) => match tool.invoke(call.input.clone()).await {
                        Ok(output) => (output.content, output.is_error),
                        Err(e) => {
                            warn!(tool = %call.name, error = %e, "tool invocation failed");
                            (format!("tool `{}` failed: {e}", call.name), true)
                        }
                    },
                    None => (format!("unknown tool `{}`", call.name), true),
                };
                self.storage.record_tool_output(&call.id, &content).await?;
                (content, is_error)
            }
            ApprovalStatus::Rejected => {
                let content = match &call.reason {
                    Some(reason) => format!("The user rejected this tool call: {reason}"),
                    None => "The user rejected this tool call.".to_string(),
                };
                (content, true)
            }
            ApprovalStatus::Timeout => (
                "The approval request timed out; the tool was not run.".to_string(),
                true,
            ),
            ApprovalStatus::Pending => {
                return Err(QuillError::Internal(format!(
                    "tool call {} has no decision",
                    call.id
                )));
            }
        };
        Ok(ContentBlock::ToolResult {
            tool_use_id: call.id.clone(),
            content,
            is_error,
        })
    }

    async fn generate(&self, request: &Request, mut turn: Turn) -> Result<WorkerOutcome, QuillError> {
        let end = match self.stream_with_retry(request, &mut turn).await {
            Ok(end) => end,
            Err(e) => return Err(self.keep_partial(request, &turn, e).await),
        };
        match end {
            TurnEnd::Finished => self.complete(request, turn).await,
            TurnEnd::ToolUse { id, name, input } => {
                if turn.round >= self.settings.max_tool_rounds {
                    let e = QuillError::Internal(format!(
                        "model exceeded {} tool rounds",
                        self.settings.max_tool_rounds
                    ));
                    return Err(self.keep_partial(request, &turn, e).await);
                }
                self.suspend(request, turn, id, name, input).await
            }
        }
    }

    async fn stream_with_retry(
        &self,
        request: &Request,
        turn: &mut Turn,
    ) -> Result<TurnEnd, QuillError> {
        let mut attempt: u32 = 0;
        loop {
            match self.stream_once(request, turn).await {
                Ok(end) => return Ok(end),
                Err(failure) => {
                    // Retrying after output would duplicate text already in the log.
                    let retryable = failure.error.is_transient()
                        && !failure.produced_output
                        && attempt < self.settings.max_retries;
                    if !retryable {
                        if !failure.partial.is_empty() {
                            turn.blocks.push(ContentBlock::Text {
                                text: failure.partial,
                            });
                        }
                        return Err(failure.error);
                    }
                    let delay = self.settings.retry_backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        request_id = %request.id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.error,
                        "transient model error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// One model call. Text is appended to the log as it arrives; the turn
    /// state is only updated once the call finished cleanly.
    async fn stream_once(&self, request: &Request, turn: &mut Turn) -> Result<TurnEnd, StreamFailure> {
        let model_request = ModelRequest {
            model: self.settings.model.clone(),
            system_prompt: self.settings.system_prompt.clone(),
            messages: turn.transcript.clone(),
            max_tokens: self.settings.max_tokens,
            tools: self.tools.definitions(),
        };
        let mut stream = self
            .provider
            .stream(model_request)
            .await
            .map_err(StreamFailure::before_output)?;

        let mut text = String::new();
        let mut usage = TokenUsage::default();
        let mut tool_use: Option<(String, String, serde_json::Value)> = None;
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(ModelChunk::TextDelta(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    self.log
                        .append(&request.id, EventPayload::TextChunk { text: delta.clone() })
                        .await
                        .map_err(|e| StreamFailure::after_output(e, text.clone()))?;
                    text.push_str(&delta);
                }
                Ok(ModelChunk::ToolUse { id, name, input }) => {
                    if tool_use.is_none() {
                        tool_use = Some((id, name, input));
                    } else {
                        warn!(request_id = %request.id, tool = %name, "ignoring extra tool use in one turn");
                    }
                }
                Ok(ModelChunk::Usage(u)) => usage.add(u),
                Ok(ModelChunk::Stop { reason }) => {
                    debug!(request_id = %request.id, ?reason, "model turn stopped");
                    break;
                }
                Err(error) => {
                    return Err(StreamFailure {
                        error,
                        produced_output: !text.is_empty(),
                        partial: text,
                    });
                }
            }
        }

        let tool_use = match tool_use {
            Some((id, name, input)) => {
                let id = self.tool_call_id(id).await.map_err(|error| StreamFailure {
                    error,
                    produced_output: !text.is_empty(),
                    partial: text.clone(),
                })?;
                Some((id, name, input))
            }
            None => None,
        };

        turn.usage.add(usage);
        turn.accumulated_text.push_str(&text);
        let mut assistant = Vec::new();
        if !text.is_empty() {
            assistant.push(ContentBlock::Text { text });
        }
        let end = match tool_use {
            None => TurnEnd::Finished,
            Some((id, name, input)) => {
                assistant.push(ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: input.clone(),
                });
                TurnEnd::ToolUse { id, name, input }
            }
        };
        if !assistant.is_empty() {
            turn.blocks.extend(assistant.iter().cloned());
            turn.transcript.push(ModelMessage {
                role: MessageRole::Assistant,
                blocks: assistant,
            });
        }
        Ok(end)
    }

    /// Tool calls are addressed by id alone, but a model only keeps its ids
    /// unique within one response. A missing or already stored id is
    /// replaced before it reaches the transcript.
    async fn tool_call_id(&self, proposed: String) -> Result<String, QuillError> {
        if proposed.is_empty() || self.storage.get_tool_call(&proposed).await?.is_some() {
            return Ok(quill_core::types::new_id());
        }
        Ok(proposed)
    }

    async fn complete(&self, request: &Request, turn: Turn) -> Result<WorkerOutcome, QuillError> {
        let message_id = request.assistant_message_id.clone();
        self.storage
            .update_message(&message_id, &turn.blocks, MessageStatus::Complete)
            .await?;
        let update = RequestUpdate {
            progress: Some(1.0),
            checkpoint: CheckpointChange::Clear,
            result_message_id: Some(message_id.clone()),
            error: None,
            usage: Some(turn.usage),
        };
        self.log
            .finish(
                &request.id,
                RequestStatus::InProgress,
                EventPayload::Completion {
                    message_id: message_id.clone(),
                    usage: turn.usage,
                },
                update,
            )
            .await?;
        info!(
            request_id = %request.id,
            input_tokens = turn.usage.input_tokens,
            output_tokens = turn.usage.output_tokens,
            "request completed"
        );
        Ok(WorkerOutcome::Completed { message_id })
    }

    async fn suspend(
        &self,
        request: &Request,
        turn: Turn,
        id: String,
        name: String,
        input: serde_json::Value,
    ) -> Result<WorkerOutcome, QuillError> {
        self.storage
            .update_message(&request.assistant_message_id, &turn.blocks, MessageStatus::Streaming)
            .await?;
        let tool_call = ToolCall {
            id: id.clone(),
            request_id: request.id.clone(),
            message_id: request.assistant_message_id.clone(),
            name,
            input,
            status: ApprovalStatus::Pending,
            reason: None,
            output: None,
            revision: 0,
            created_at: now_timestamp(),
            decided_at: None,
        };
        let checkpoint = Checkpoint {
            accumulated_text: turn.accumulated_text,
            transcript: turn.transcript,
            pending_tool_call_id: id.clone(),
            usage: turn.usage,
            round: turn.round,
        };
        self.log.suspend(&tool_call, &checkpoint).await?;
        info!(request_id = %request.id, tool_call_id = %id, tool = %tool_call.name, "awaiting approval");
        Ok(WorkerOutcome::Suspended { tool_call_id: id })
    }

    /// Stores what the turn produced so far as a failed message, then hands
    /// back `cause` for [`Self::fail`].
    async fn keep_partial(&self, request: &Request, turn: &Turn, cause: QuillError) -> QuillError {
        if let Err(e) = self
            .storage
            .update_message(&request.assistant_message_id, &turn.blocks, MessageStatus::Failed)
            .await
        {
            warn!(request_id = %request.id, error = %e, "could not keep partial message");
        }
        cause
    }

    /// Marks the assistant message failed, keeping its blocks.
    async fn settle_message(&self, request: &Request) {
        let message = match self.storage.get_message(&request.assistant_message_id).await {
            Ok(Some(message)) if message.status != MessageStatus::Failed => message,
            Ok(_) => return,
            Err(e) => {
                warn!(request_id = %request.id, error = %e, "could not load assistant message");
                return;
            }
        };
        if let Err(e) = self
            .storage
            .update_message(&message.id, &message.blocks, MessageStatus::Failed)
            .await
        {
            warn!(request_id = %request.id, error = %e, "could not mark assistant message failed");
        }
    }

    /// Records a terminal failure from whatever non-terminal status the request is in.
    async fn fail(&self, request_id: &str, cause: QuillError) -> WorkerOutcome {
        let message = cause.to_string();
        let request = match self.storage.get_request(request_id).await {
            Ok(Some(request)) => request,
            Ok(None) => {
                warn!(request_id, error = %message, "failed request no longer exists");
                return WorkerOutcome::Failed { message };
            }
            Err(e) => {
                error!(request_id, error = %e, cause = %message, "could not load request to record failure");
                return WorkerOutcome::Failed { message };
            }
        };
        let current = request.status;
        if current.is_terminal() {
            debug!(request_id, status = %current, error = %message, "request already finished");
            return WorkerOutcome::Skipped;
        }

        error!(request_id, code = cause.code(), error = %message, "request failed");
        self.settle_message(&request).await;
        if let Err(e) = self
            .log
            .finish(
                request_id,
                current,
                EventPayload::Error {
                    message: message.clone(),
                },
                RequestUpdate::failure(message.clone()),
            )
            .await
        {
            error!(request_id, error = %e, "could not record request failure");
        }
        WorkerOutcome::Failed { message }
    }
}
