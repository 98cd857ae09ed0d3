// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Startup reconciliation of requests left by a previous process.
//!
//! - pending requests are dispatched again
//! - in-progress requests without a checkpoint were mid-stream when the
//!   process died and are failed
//! - checkpointed requests whose tool call was decided are resumed
//! - checkpointed requests still awaiting a decision are left alone

use std::sync::Arc;

use quill_core::types::RequestUpdate;
use quill_core::{EventPayload, QuillError, RequestStatus, StorageAdapter};
use tracing::{info, warn};

use crate::dispatcher::Dispatcher;
use crate::event_log::EventLog;

pub const INTERRUPTED_MESSAGE: &str = "execution interrupted by a server restart";

/// What recovery did, by category.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    pub redispatched: usize,
    pub resumed: usize,
    pub awaiting_approval: usize,
    pub interrupted: usize,
}

pub async fn recover(
    storage: &Arc<dyn StorageAdapter>,
    log: &EventLog,
    dispatcher: &Dispatcher,
) -> Result<RecoveryReport, QuillError> {
    let mut report = RecoveryReport::default();

    for request in storage.list_requests(Some(RequestStatus::Pending)).await? {
        dispatcher.run(&request.id);
        report.redispatched += 1;
    }

    for request in storage.list_requests(Some(RequestStatus::InProgress)).await? {
        let pending = request.checkpoint.as_ref().map(|c| c.pending_tool_call_id.clone());
        let reason = match pending {
            None => INTERRUPTED_MESSAGE.to_string(),
            Some(tool_call_id) => match storage.get_tool_call(&tool_call_id).await? {
                Some(call) if call.status.is_decided() => {
                    dispatcher.resume(&request.id);
                    report.resumed += 1;
                    continue;
                }
                Some(_) => {
                    report.awaiting_approval += 1;
                    continue;
                }
                None => format!("checkpoint references missing tool call {tool_call_id}"),
            },
        };

        match log
            .finish(
                &request.id,
                RequestStatus::InProgress,
                EventPayload::Error {
                    message: reason.clone(),
                },
                RequestUpdate::failure(reason),
            )
            .await
        {
            Ok(_) => report.interrupted += 1,
            Err(e) => warn!(request_id = %request.id, error = %e, "could not fail interrupted request"),
        }
    }

    info!(
        redispatched = report.redispatched,
        resumed = report.resumed,
        awaiting_approval = report.awaiting_approval,
        interrupted = report.interrupted,
        "recovery complete"
    );
    Ok(report)
}
