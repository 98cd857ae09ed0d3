// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service runtime: the operations exposed to the gateway and in-process clients.
//!
//! Submission returns as soon as the request is durable; execution happens
//! on worker tasks, bounded by a semaphore. Every read and decision is
//! scoped to the caller: entities owned by someone else are reported as
//! not found.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use quill_bus::EventBus;
use quill_config::QuillConfig;
use quill_core::types::{EventStream, Message, NewSubmission, Request, StatusView, Submission, ToolCall};
use quill_core::{ExecutionEvent, ProviderAdapter, QuillError, StorageAdapter, UsageGate};
use tokio::sync::{Semaphore, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::approval::ApprovalGate;
use crate::dispatcher::{Dispatcher, Job};
use crate::event_log::EventLog;
use crate::recovery::{self, RecoveryReport};
use crate::shutdown::drain_workers;
use crate::tools::ToolRegistry;
use crate::usage::Unmetered;
use crate::worker::{ExecutionWorker, WorkerSettings};

/// Runtime tuning, usually derived from [`QuillConfig`].
#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub worker: WorkerSettings,
    pub max_concurrent: usize,
    pub approval_timeout: Duration,
    pub sweep_interval: Duration,
    pub shutdown_grace: Duration,
    pub event_buffer: usize,
}

impl RuntimeSettings {
    pub fn from_config(config: &QuillConfig) -> Self {
        Self {
            worker: WorkerSettings::from_config(config),
            max_concurrent: config.worker.max_concurrent,
            approval_timeout: Duration::from_secs(config.worker.approval_timeout_secs),
            sweep_interval: Duration::from_secs(config.worker.sweep_interval_secs),
            shutdown_grace: Duration::from_secs(config.worker.shutdown_grace_secs),
            event_buffer: config.worker.event_buffer,
        }
    }
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self::from_config(&QuillConfig::default())
    }
}

pub struct Runtime {
    storage: Arc<dyn StorageAdapter>,
    log: EventLog,
    worker: Arc<ExecutionWorker>,
    gate: ApprovalGate,
    dispatcher: Dispatcher,
    jobs: Mutex<Option<mpsc::UnboundedReceiver<Job>>>,
    semaphore: Arc<Semaphore>,
    tasks: TaskTracker,
    settings: RuntimeSettings,
}

impl Runtime {
    /// Builds a runtime with every request admitted by the usage gate.
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        tools: ToolRegistry,
        settings: RuntimeSettings,
    ) -> Arc<Self> {
        Self::with_usage_gate(storage, provider, tools, Arc::new(Unmetered), settings)
    }

    pub fn with_usage_gate(
        storage: Arc<dyn StorageAdapter>,
        provider: Arc<dyn ProviderAdapter>,
        tools: ToolRegistry,
        usage_gate: Arc<dyn UsageGate>,
        settings: RuntimeSettings,
    ) -> Arc<Self> {
        let bus = Arc::new(EventBus::new(settings.event_buffer));
        let log = EventLog::new(storage.clone(), bus);
        let (dispatcher, jobs) = Dispatcher::channel();
        let worker = Arc::new(ExecutionWorker::new(
            storage.clone(),
            provider,
            Arc::new(tools),
            usage_gate,
            log.clone(),
            settings.worker.clone(),
        ));
        let gate = ApprovalGate::new(storage.clone(), dispatcher.clone(), settings.approval_timeout);
        Arc::new(Self {
            storage,
            log,
            worker,
            gate,
            dispatcher,
            jobs: Mutex::new(Some(jobs)),
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            tasks: TaskTracker::new(),
            settings,
        })
    }

    /// Starts the job loop and the approval sweeper. Both stop when `cancel` fires.
    ///
    /// Calling `start` more than once has no effect.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) {
        let jobs = match self.jobs.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(jobs) = jobs else {
            warn!("runtime already started");
            return;
        };
        tokio::spawn(self.clone().dispatch_loop(jobs, cancel.clone()));
        tokio::spawn(self.clone().sweep_loop(cancel));
        info!(
            max_concurrent = self.settings.max_concurrent,
            sweep_interval_secs = self.settings.sweep_interval.as_secs(),
            "runtime started"
        );
    }

    async fn dispatch_loop(self: Arc<Self>, mut jobs: mpsc::UnboundedReceiver<Job>, cancel: CancellationToken) {
        loop {
            let job = tokio::select! {
                _ = cancel.cancelled() => break,
                job = jobs.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let worker = self.worker.clone();
            self.tasks.spawn(async move {
                let _permit = permit;
                let outcome = match &job {
                    Job::Run(id) => worker.run(id).await,
                    Job::Resume(id) => worker.resume(id).await,
                };
                debug!(request_id = job.request_id(), ?outcome, "job finished");
            });
        }
        debug!("job loop stopped");
    }

    async fn sweep_loop(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.settings.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.gate.expire_stale(Utc::now()).await {
                Ok(expired) if !expired.is_empty() => {
                    info!(count = expired.len(), "expired stale approvals");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "approval sweep failed"),
            }
        }
        debug!("approval sweeper stopped");
    }

    /// Reconciles requests left over from a previous process.
    pub async fn recover(&self) -> Result<RecoveryReport, QuillError> {
        recovery::recover(&self.storage, &self.log, &self.dispatcher).await
    }

    /// Waits for running workers, up to the shutdown grace period.
    pub async fn shutdown(&self) -> bool {
        drain_workers(&self.tasks, self.settings.shutdown_grace).await
    }

    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.storage
    }

    pub fn event_log(&self) -> &EventLog {
        &self.log
    }

    pub fn approval_gate(&self) -> &ApprovalGate {
        &self.gate
    }

    // --- Caller operations ---

    /// Records a submission and schedules it. Duplicate keys return the
    /// original request without scheduling it again.
    pub async fn submit(
        &self,
        owner: &str,
        idempotency_key: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<Submission, QuillError> {
        let submission = self
            .storage
            .submit(&NewSubmission {
                owner: owner.to_string(),
                idempotency_key: idempotency_key.to_string(),
                thread_id: thread_id.to_string(),
                content: content.to_string(),
            })
            .await?;
        if submission.created {
            info!(request_id = %submission.request_id, owner, thread_id, "request submitted");
            self.dispatcher.run(&submission.request_id);
        } else {
            debug!(request_id = %submission.request_id, "duplicate submission");
        }
        Ok(submission)
    }

    /// Loads a request owned by `owner`.
    pub async fn request(&self, owner: &str, request_id: &str) -> Result<Request, QuillError> {
        match self.storage.get_request(request_id).await? {
            Some(request) if request.owner == owner => Ok(request),
            _ => Err(QuillError::not_found("request", request_id)),
        }
    }

    pub async fn status(&self, owner: &str, request_id: &str) -> Result<StatusView, QuillError> {
        Ok(self.request(owner, request_id).await?.status_view())
    }

    pub async fn events(
        &self,
        owner: &str,
        request_id: &str,
        after_seq: i64,
    ) -> Result<Vec<ExecutionEvent>, QuillError> {
        self.request(owner, request_id).await?;
        self.log.list(request_id, after_seq).await
    }

    /// Replay-then-live event stream for a request owned by `owner`.
    pub async fn attach(
        &self,
        owner: &str,
        request_id: &str,
        after_seq: i64,
    ) -> Result<EventStream, QuillError> {
        self.request(owner, request_id).await?;
        Ok(self.log.attach(request_id, after_seq))
    }

    pub async fn message(&self, owner: &str, message_id: &str) -> Result<Message, QuillError> {
        let message = self
            .storage
            .get_message(message_id)
            .await?
            .ok_or_else(|| QuillError::not_found("message", message_id))?;
        let Some(request_id) = message.request_id.as_deref() else {
            return Err(QuillError::not_found("message", message_id));
        };
        match self.request(owner, request_id).await {
            Ok(_) => Ok(message),
            Err(QuillError::NotFound { .. }) => Err(QuillError::not_found("message", message_id)),
            Err(e) => Err(e),
        }
    }

    pub async fn tool_call(&self, owner: &str, tool_call_id: &str) -> Result<ToolCall, QuillError> {
        let call = self
            .storage
            .get_tool_call(tool_call_id)
            .await?
            .ok_or_else(|| QuillError::not_found("tool call", tool_call_id))?;
        match self.request(owner, &call.request_id).await {
            Ok(_) => Ok(call),
            Err(QuillError::NotFound { .. }) => Err(QuillError::not_found("tool call", tool_call_id)),
            Err(e) => Err(e),
        }
    }

    pub async fn approve(&self, owner: &str, tool_call_id: &str) -> Result<ToolCall, QuillError> {
        self.tool_call(owner, tool_call_id).await?;
        self.gate.approve(tool_call_id).await
    }

    pub async fn reject(
        &self,
        owner: &str,
        tool_call_id: &str,
        reason: Option<&str>,
    ) -> Result<ToolCall, QuillError> {
        self.tool_call(owner, tool_call_id).await?;
        self.gate.reject(tool_call_id, reason).await
    }
}
