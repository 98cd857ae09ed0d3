// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Approval gate for model-requested tool calls.
//!
//! A decision is a compare-and-set on the tool call row: the first of
//! approve, reject, or timeout wins and later ones fail with
//! `AlreadyDecided`. The winning decision schedules a resume.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quill_core::types::{ToolCall, format_timestamp};
use quill_core::{ApprovalStatus, QuillError, StorageAdapter};
use tracing::{debug, info, warn};

use crate::dispatcher::Dispatcher;

#[derive(Clone)]
pub struct ApprovalGate {
    storage: Arc<dyn StorageAdapter>,
    dispatcher: Dispatcher,
    timeout: Duration,
}

impl ApprovalGate {
    pub fn new(storage: Arc<dyn StorageAdapter>, dispatcher: Dispatcher, timeout: Duration) -> Self {
        Self {
            storage,
            dispatcher,
            timeout,
        }
    }

    pub async fn approve(&self, tool_call_id: &str) -> Result<ToolCall, QuillError> {
        self.decide(tool_call_id, ApprovalStatus::Approved, None).await
    }

    pub async fn reject(
        &self,
        tool_call_id: &str,
        reason: Option<&str>,
    ) -> Result<ToolCall, QuillError> {
        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        self.decide(tool_call_id, ApprovalStatus::Rejected, reason).await
    }

    async fn decide(
        &self,
        tool_call_id: &str,
        decision: ApprovalStatus,
        reason: Option<&str>,
    ) -> Result<ToolCall, QuillError> {
        let decided = self
            .storage
            .decide_tool_call(tool_call_id, decision, reason)
            .await?;
        info!(
            tool_call_id,
            request_id = %decided.request_id,
            decision = %decision,
            "tool call decided"
        );
        self.dispatcher.resume(&decided.request_id);
        Ok(decided)
    }

    /// Times out tool calls pending for longer than the approval timeout.
    ///
    /// Returns the calls this sweep decided. Calls decided concurrently by
    /// a user, or whose request already finished, are skipped.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> Result<Vec<ToolCall>, QuillError> {
        let timeout = chrono::Duration::from_std(self.timeout)
            .map_err(|e| QuillError::Internal(format!("approval timeout out of range: {e}")))?;
        let cutoff = format_timestamp(now - timeout);

        let mut expired = Vec::new();
        for call in self.storage.list_stale_tool_calls(&cutoff).await? {
            match self.decide(&call.id, ApprovalStatus::Timeout, None).await {
                Ok(decided) => expired.push(decided),
                Err(QuillError::AlreadyDecided { .. } | QuillError::IllegalTransition { .. }) => {
                    debug!(tool_call_id = %call.id, "stale tool call no longer pending");
                }
                Err(e) => {
                    warn!(tool_call_id = %call.id, error = %e, "could not expire tool call");
                }
            }
        }
        Ok(expired)
    }
}
