// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable event log with live fan-out.
//!
//! Every event is committed to storage before it is published on the
//! [`EventBus`]. Readers attach by subscribing first and then replaying
//! the stored tail, so nothing committed between the two steps is missed.
//! Duplicates are dropped by sequence number and gaps are filled from
//! storage, so an attached stream is exactly the stored sequence.

use std::collections::VecDeque;
use std::sync::Arc;

use quill_bus::EventBus;
use quill_core::types::{Checkpoint, EventStream, RequestUpdate, ToolCall};
use quill_core::{EventPayload, ExecutionEvent, QuillError, RequestStatus, StorageAdapter};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// Append and replay access to execution events.
#[derive(Clone)]
pub struct EventLog {
    storage: Arc<dyn StorageAdapter>,
    bus: Arc<EventBus>,
}

impl EventLog {
    pub fn new(storage: Arc<dyn StorageAdapter>, bus: Arc<EventBus>) -> Self {
        Self { storage, bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Persists a non-terminal event and publishes it.
    pub async fn append(
        &self,
        request_id: &str,
        payload: EventPayload,
    ) -> Result<ExecutionEvent, QuillError> {
        let event = self.storage.append_event(request_id, &payload).await?;
        self.bus.publish(&event);
        Ok(event)
    }

    /// Persists a terminal event together with the final status, then publishes it.
    pub async fn finish(
        &self,
        request_id: &str,
        expected: RequestStatus,
        payload: EventPayload,
        update: RequestUpdate,
    ) -> Result<ExecutionEvent, QuillError> {
        let event = self
            .storage
            .finish_request(request_id, expected, &payload, update)
            .await?;
        self.bus.publish(&event);
        Ok(event)
    }

    /// Persists a pending tool call with its checkpoint, then publishes the
    /// `tool_call` event.
    pub async fn suspend(
        &self,
        tool_call: &ToolCall,
        checkpoint: &Checkpoint,
    ) -> Result<ExecutionEvent, QuillError> {
        let event = self
            .storage
            .suspend_for_approval(tool_call, checkpoint)
            .await?;
        self.bus.publish(&event);
        Ok(event)
    }

    /// Stored events with `seq > after_seq`.
    pub async fn list(
        &self,
        request_id: &str,
        after_seq: i64,
    ) -> Result<Vec<ExecutionEvent>, QuillError> {
        self.storage.list_events(request_id, after_seq).await
    }

    /// Replays events after `after_seq` and follows live ones.
    ///
    /// The stream ends after the terminal event. A request paused on an
    /// approval keeps the stream open until it continues.
    pub fn attach(&self, request_id: &str, after_seq: i64) -> EventStream {
        let rx = self.bus.subscribe(request_id);
        let attach = Attach {
            storage: self.storage.clone(),
            bus: self.bus.clone(),
            request_id: request_id.to_string(),
            rx: Some(rx),
            backlog: VecDeque::new(),
            last_seq: after_seq.max(0),
            reload: true,
            live_closed: false,
            done: false,
        };
        Box::pin(futures::stream::unfold(attach, |mut attach| async move {
            attach.next_event().await.map(|item| (item, attach))
        }))
    }
}

struct Attach {
    storage: Arc<dyn StorageAdapter>,
    bus: Arc<EventBus>,
    request_id: String,
    rx: Option<broadcast::Receiver<ExecutionEvent>>,
    backlog: VecDeque<ExecutionEvent>,
    last_seq: i64,
    reload: bool,
    live_closed: bool,
    done: bool,
}

impl Attach {
    async fn next_event(&mut self) -> Option<Result<ExecutionEvent, QuillError>> {
        loop {
            if self.done {
                return None;
            }

            if self.reload {
                self.reload = false;
                match self.storage.list_events(&self.request_id, self.last_seq).await {
                    Ok(events) => self.backlog = events.into(),
                    Err(e) => {
                        self.close();
                        return Some(Err(e));
                    }
                }
            }

            if let Some(event) = self.backlog.pop_front() {
                if event.seq <= self.last_seq {
                    continue;
                }
                if event.seq != self.last_seq + 1 {
                    debug!(
                        request_id = %self.request_id,
                        expected = self.last_seq + 1,
                        got = event.seq,
                        "gap in live events, re-reading log"
                    );
                    self.backlog.clear();
                    self.reload = true;
                    continue;
                }
                self.last_seq = event.seq;
                if event.payload.is_terminal() {
                    self.close();
                }
                return Some(Ok(event));
            }

            if self.live_closed {
                self.close();
                return None;
            }

            let Some(rx) = self.rx.as_mut() else {
                self.close();
                return None;
            };
            match rx.recv().await {
                Ok(event) => self.backlog.push_back(event),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(request_id = %self.request_id, skipped, "subscriber lagged, re-reading log");
                    self.reload = true;
                }
                Err(RecvError::Closed) => {
                    self.live_closed = true;
                    self.reload = true;
                }
            }
        }
    }

    fn close(&mut self) {
        self.done = true;
        self.rx = None;
        self.bus.release(&self.request_id);
    }
}
