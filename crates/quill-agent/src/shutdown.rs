// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process shutdown for `quill serve`.
//!
//! SIGTERM or SIGINT cancels a [`CancellationToken`]; the runtime then stops
//! taking jobs and gives running workers a grace period to finish.
//! Anything still running afterwards is reconciled by recovery on the next
//! start.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Spawn a task that cancels the returned token on SIGTERM or SIGINT.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
        debug!("shutdown requested, job loop stopping");
    });

    token
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "could not install SIGTERM handler, only Ctrl+C will stop the server");
            if tokio::signal::ctrl_c().await.is_ok() {
                info!(signal = "SIGINT", "stopping quill serve");
            }
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!(signal = "SIGINT", "stopping quill serve");
        }
        _ = sigterm.recv() => {
            info!(signal = "SIGTERM", "stopping quill serve");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!(signal = "ctrl-c", "stopping quill serve");
}

/// Waits up to `timeout` for tracked workers to finish.
///
/// Closes the tracker first, so no new workers can be added. Returns
/// whether every worker finished in time.
pub async fn drain_workers(tasks: &TaskTracker, timeout: Duration) -> bool {
    tasks.close();
    if tasks.is_empty() {
        info!("no active workers to drain");
        return true;
    }

    info!(count = tasks.len(), "waiting for active workers to complete");
    match tokio::time::timeout(timeout, tasks.wait()).await {
        Ok(()) => {
            info!("all workers drained successfully");
            true
        }
        Err(_) => {
            warn!(
                remaining = tasks.len(),
                "timeout reached, interrupted requests will be failed on next start"
            );
            false
        }
    }
}
