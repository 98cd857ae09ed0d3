// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-request event fan-out.
//!
//! The bus carries events that are already durable; it never stores
//! anything itself. A subscriber that falls behind the channel buffer
//! observes `Lagged` and must re-read the event log.

use dashmap::DashMap;
use quill_core::ExecutionEvent;
use tokio::sync::broadcast;
use tracing::trace;

/// In-process publish/subscribe keyed by request ID.
pub struct EventBus {
    channels: DashMap<String, broadcast::Sender<ExecutionEvent>>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus whose per-request channels buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to live events of a request, creating the channel on demand.
    pub fn subscribe(&self, request_id: &str) -> broadcast::Receiver<ExecutionEvent> {
        self.channels
            .entry(request_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver an event to current subscribers. Returns how many received it.
    ///
    /// A terminal event closes the request's channel after delivery, so
    /// receivers drain their buffer and then observe `Closed`.
    pub fn publish(&self, event: &ExecutionEvent) -> usize {
        let delivered = match self.channels.get(&event.request_id) {
            Some(sender) => sender.send(event.clone()).unwrap_or(0),
            None => 0,
        };
        if event.payload.is_terminal() {
            self.channels.remove(&event.request_id);
        }
        trace!(
            request_id = %event.request_id,
            seq = event.seq,
            delivered,
            "event published"
        );
        delivered
    }

    /// Drop the channel of a request once nobody listens to it.
    pub fn release(&self, request_id: &str) {
        self.channels
            .remove_if(request_id, |_, sender| sender.receiver_count() == 0);
    }

    /// Number of live receivers for a request.
    pub fn subscriber_count(&self, request_id: &str) -> usize {
        self.channels
            .get(request_id)
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }

    /// Number of requests with an open channel.
    pub fn active_channels(&self) -> usize {
        self.channels.len()
    }
}
