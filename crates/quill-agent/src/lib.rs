// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request execution for the Quill service.
//!
//! The [`Runtime`] ties the pieces together:
//! - [`ExecutionWorker`] drives one request through the model, streaming
//!   text into the [`EventLog`] and pausing on tool calls
//! - [`ApprovalGate`] records approval decisions and schedules resumption
//! - [`Dispatcher`] decouples submission from execution
//! - [`recovery`] reconciles requests left over from a previous process

pub mod approval;
pub mod builtin;
pub mod context;
pub mod dispatcher;
pub mod event_log;
pub mod recovery;
pub mod runtime;
pub mod shutdown;
pub mod tools;
pub mod usage;
pub mod worker;

pub use approval::ApprovalGate;
pub use dispatcher::{Dispatcher, Job};
pub use event_log::EventLog;
pub use recovery::RecoveryReport;
pub use runtime::{Runtime, RuntimeSettings};
pub use tools::{Tool, ToolOutput, ToolRegistry};
pub use usage::Unmetered;
pub use worker::{ExecutionWorker, WorkerOutcome, WorkerSettings};
