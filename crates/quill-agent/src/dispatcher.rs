// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Work queue between request intake and execution workers.
//!
//! Jobs are in-memory hints; the request rows are the source of truth.
//! A job lost to a crash is re-derived by recovery at the next start.

use tokio::sync::mpsc;
use tracing::warn;

/// A unit of work for an execution worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Start a pending request.
    Run(String),
    /// Continue a request whose tool call was decided.
    Resume(String),
}

impl Job {
    pub fn request_id(&self) -> &str {
        match self {
            Job::Run(id) | Job::Resume(id) => id,
        }
    }
}

/// Cloneable handle for scheduling jobs.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Job>,
}

impl Dispatcher {
    /// Create a dispatcher and the receiver the runtime drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn run(&self, request_id: &str) {
        self.send(Job::Run(request_id.to_string()));
    }

    pub fn resume(&self, request_id: &str) {
        self.send(Job::Resume(request_id.to_string()));
    }

    fn send(&self, job: Job) {
        if let Err(e) = self.tx.send(job) {
            warn!(request_id = e.0.request_id(), "dispatcher closed, job dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn jobs_arrive_in_order() {
        let (dispatcher, mut rx) = Dispatcher::channel();
        dispatcher.run("r1");
        dispatcher.resume("r2");
        assert_eq!(rx.recv().await, Some(Job::Run("r1".into())));
        assert_eq!(rx.recv().await, Some(Job::Resume("r2".into())));
    }

    #[test]
    fn sending_after_close_does_not_panic() {
        let (dispatcher, rx) = Dispatcher::channel();
        drop(rx);
        dispatcher.run("r1");
    }
}
