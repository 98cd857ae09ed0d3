// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation context assembly for the first model turn.

use quill_core::types::{Message, MessageStatus, ModelMessage};

/// Build the model transcript from a thread's stored messages.
///
/// Only complete messages are included, and the assistant message being
/// produced (`exclude_id`) is always left out.
pub fn build_transcript(history: &[Message], exclude_id: &str) -> Vec<ModelMessage> {
    history
        .iter()
        .filter(|m| m.status == MessageStatus::Complete && m.id != exclude_id)
        .filter(|m| !m.blocks.is_empty())
        .map(|m| ModelMessage {
            role: m.role,
            blocks: m.blocks.clone(),
        })
        .collect()
}
