// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Seams between the runtime and its backends.
//!
//! Storage and model providers are trait objects (`Arc<dyn ...>`), so
//! every async method goes through `#[async_trait]`.

pub mod adapter;
pub mod provider;
pub mod storage;
pub mod usage;

pub use adapter::PluginAdapter;
pub use provider::ProviderAdapter;
pub use storage::StorageAdapter;
pub use usage::UsageGate;
