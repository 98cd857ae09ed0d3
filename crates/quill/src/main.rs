// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quill - asynchronous agent execution with replayable event streams.
//!
//! This is the binary entry point: the server and its command-line client.

mod client;
mod echo;
mod serve;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use quill_config::model::QuillConfig;

/// Quill - asynchronous agent execution with replayable event streams.
#[derive(Parser, Debug)]
#[command(name = "quill", version, about, long_about = None)]
struct Cli {
    /// Configuration file to load instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the execution server and its HTTP gateway.
    Serve,
    /// Send a message on a thread and follow the response.
    Send {
        #[arg(long)]
        thread: String,
        /// Message text; multiple words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        content: Vec<String>,
    },
    /// Pick up a thread's unfinished request after a restart or disconnect.
    Resume {
        #[arg(long)]
        thread: String,
    },
    /// Show the status of a request.
    Status { request_id: String },
    /// Approve a pending tool call.
    Approve { tool_call_id: String },
    /// Reject a pending tool call.
    Reject {
        tool_call_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

fn load_config(path: Option<&std::path::Path>) -> Option<QuillConfig> {
    let loaded = match path {
        Some(path) => quill_config::load_and_validate_path(path),
        None => quill_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => Some(config),
        Err(errors) => {
            quill_config::render_errors(&errors);
            None
        }
    }
}

/// Initialize the tracing subscriber once for the process.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quill={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(config) = load_config(cli.config.as_deref()) else {
        return ExitCode::FAILURE;
    };

    // Client commands keep stderr quiet unless asked.
    let level = match cli.command {
        Commands::Serve => config.agent.log_level.clone(),
        _ => "warn".to_string(),
    };
    init_tracing(&level);

    let result = match cli.command {
        Commands::Serve => serve::run_serve(config).await.map(|()| ExitCode::SUCCESS),
        Commands::Send { thread, content } => {
            client::run_send(&config, &thread, &content.join(" ")).await
        }
        Commands::Resume { thread } => client::run_resume(&config, &thread).await,
        Commands::Status { request_id } => client::run_status(&config, &request_id).await,
        Commands::Approve { tool_call_id } => client::run_approve(&config, &tool_call_id).await,
        Commands::Reject {
            tool_call_id,
            reason,
        } => client::run_reject(&config, &tool_call_id, reason.as_deref()).await,
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn send_joins_words_and_takes_thread() {
        let cli = Cli::parse_from(["quill", "send", "--thread", "t1", "Say", "hello"]);
        match cli.command {
            Commands::Send { thread, content } => {
                assert_eq!(thread, "t1");
                assert_eq!(content.join(" "), "Say hello");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn reject_reason_is_optional() {
        let cli = Cli::parse_from(["quill", "--config", "q.toml", "reject", "tc1"]);
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("q.toml")));
        assert!(matches!(cli.command, Commands::Reject { reason: None, .. }));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = quill_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.agent.name, "quill");
        assert_eq!(config.model.provider, "echo");
    }
}
