// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Quill integration tests.
//!
//! Provides scripted adapters and a harness that runs the full execution
//! stack against a temporary SQLite database, with no external services.
//!
//! # Components
//!
//! - [`MockProvider`] - model provider that plays back scripted turns
//! - [`ScriptedTool`] - tool with a fixed result that records its inputs
//! - [`TestHarness`] - storage, runtime, and helpers to wait on requests

pub mod harness;
pub mod mock_provider;
pub mod scripted_tool;

pub use harness::{TEST_OWNER, TEST_THREAD, TestHarness, TestHarnessBuilder};
pub use mock_provider::{MockProvider, MockTurn};
pub use scripted_tool::ScriptedTool;
