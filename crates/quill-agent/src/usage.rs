// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use async_trait::async_trait;
use quill_core::{QuillError, UsageGate};

/// Usage gate that admits every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unmetered;

#[async_trait]
impl UsageGate for Unmetered {
    async fn check(&self, _owner: &str) -> Result<(), QuillError> {
        Ok(())
    }
}
