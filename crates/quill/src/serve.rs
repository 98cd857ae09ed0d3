// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quill serve` command implementation.
//!
//! Opens storage, reconciles requests left by a previous process, starts
//! the job loop and the approval sweeper, and serves the gateway until a
//! shutdown signal. In-flight workers are drained before storage closes.

use std::sync::Arc;
use std::time::Duration;

use quill_agent::builtin::register_builtins;
use quill_agent::shutdown::install_signal_handler;
use quill_agent::{Runtime, RuntimeSettings, ToolRegistry};
use quill_config::model::{ModelConfig, QuillConfig};
use quill_core::{PluginAdapter, ProviderAdapter, QuillError, StorageAdapter};
use quill_gateway::GatewayState;
use quill_storage::SqliteStorage;
use tracing::{info, warn};

use crate::echo::EchoProvider;

/// Delay between echoed words, so streaming is visible in a terminal.
const ECHO_CHUNK_DELAY: Duration = Duration::from_millis(40);

fn build_provider(config: &ModelConfig) -> Result<Arc<dyn ProviderAdapter>, QuillError> {
    match config.provider.as_str() {
        "echo" => Ok(Arc::new(EchoProvider::new(ECHO_CHUNK_DELAY))),
        other => Err(QuillError::Config(format!("unknown model provider `{other}`"))),
    }
}

/// Runs the `quill serve` command.
pub async fn run_serve(config: QuillConfig) -> Result<(), QuillError> {
    info!(name = %config.agent.name, "starting quill serve");

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

    let provider = build_provider(&config.model)?;
    info!(
        provider = provider.name(),
        version = %provider.version(),
        model = %config.model.model,
        "model provider ready"
    );

    let mut tools = ToolRegistry::new();
    register_builtins(&mut tools);
    info!("tool registry initialized with {} built-in tools", tools.len());

    let runtime = Runtime::new(
        storage.clone(),
        provider,
        tools,
        RuntimeSettings::from_config(&config),
    );

    let report = runtime.recover().await?;
    info!(
        redispatched = report.redispatched,
        resumed = report.resumed,
        awaiting_approval = report.awaiting_approval,
        interrupted = report.interrupted,
        "startup recovery complete"
    );

    let cancel = install_signal_handler();
    runtime.start(cancel.clone());

    let listener = quill_gateway::bind(&config.gateway).await?;
    let state = GatewayState::new(runtime.clone(), &config.gateway);
    let served = quill_gateway::serve(listener, state, cancel.clone()).await;

    // The gateway may also stop on its own error; stop the job loop either way.
    cancel.cancel();
    if runtime.shutdown().await {
        info!("all workers finished");
    } else {
        warn!("workers still running after the grace period; their requests are recovered on next start");
    }

    storage.close().await?;
    info!("quill serve stopped");
    served
}
