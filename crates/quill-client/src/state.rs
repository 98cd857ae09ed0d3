// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local session state that survives client restarts.
//!
//! One JSON document maps each thread to its in-flight work: a submission
//! whose response was never seen, or the request being followed and the
//! last event already delivered for it. The file
//! is rewritten whole through a temporary sibling and a rename.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use quill_core::QuillError;
use quill_core::types::Submission;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// A submission that was sent, or is about to be, without a recorded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingSubmission {
    pub idempotency_key: String,
    pub content: String,
}

/// In-flight work of one thread.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingSubmission>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisional_message_id: Option<String>,
    /// Highest event `seq` of `request_id` already passed to the caller.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub last_seq: i64,
}

fn is_zero(seq: &i64) -> bool {
    *seq == 0
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionState {
    #[serde(default)]
    threads: BTreeMap<String, ThreadEntry>,
}

/// File-backed session state.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    state: Mutex<SessionState>,
}

impl StateStore {
    /// Load the state file, starting empty when it does not exist yet.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, QuillError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| QuillError::Storage {
                source: format!("corrupt session state {}: {e}", path.display()).into(),
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => SessionState::default(),
            Err(e) => return Err(QuillError::Storage { source: Box::new(e) }),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn thread(&self, thread_id: &str) -> Option<ThreadEntry> {
        self.state.lock().await.threads.get(thread_id).cloned()
    }

    /// Record a submission before it is sent, so a crash can re-send it with the same key.
    pub async fn record_pending(
        &self,
        thread_id: &str,
        pending: PendingSubmission,
    ) -> Result<(), QuillError> {
        let mut state = self.state.lock().await;
        state.threads.insert(
            thread_id.to_string(),
            ThreadEntry {
                pending: Some(pending),
                ..ThreadEntry::default()
            },
        );
        self.persist(&state).await
    }

    /// Replace the pending record with the accepted request.
    pub async fn record_submitted(
        &self,
        thread_id: &str,
        submission: &Submission,
    ) -> Result<(), QuillError> {
        let mut state = self.state.lock().await;
        state.threads.insert(
            thread_id.to_string(),
            ThreadEntry {
                pending: None,
                request_id: Some(submission.request_id.clone()),
                provisional_message_id: Some(submission.provisional_message_id.clone()),
                last_seq: 0,
            },
        );
        self.persist(&state).await
    }

    /// Where to pick up `request_id` on this thread; 0 for a full replay.
    pub async fn cursor(&self, thread_id: &str, request_id: &str) -> i64 {
        self.state
            .lock()
            .await
            .threads
            .get(thread_id)
            .filter(|entry| entry.request_id.as_deref() == Some(request_id))
            .map_or(0, |entry| entry.last_seq)
    }

    /// Remember the last event delivered for the thread's recorded request.
    ///
    /// Ignored when the thread no longer follows `request_id`.
    pub async fn record_cursor(
        &self,
        thread_id: &str,
        request_id: &str,
        seq: i64,
    ) -> Result<(), QuillError> {
        let mut state = self.state.lock().await;
        let Some(entry) = state.threads.get_mut(thread_id) else {
            return Ok(());
        };
        if entry.request_id.as_deref() != Some(request_id) || entry.last_seq >= seq {
            return Ok(());
        }
        entry.last_seq = seq;
        self.persist(&state).await
    }

    /// Forget a thread's in-flight work once its outcome is known.
    pub async fn clear(&self, thread_id: &str) -> Result<(), QuillError> {
        let mut state = self.state.lock().await;
        if state.threads.remove(thread_id).is_none() {
            return Ok(());
        }
        self.persist(&state).await
    }

    async fn persist(&self, state: &SessionState) -> Result<(), QuillError> {
        let json = serde_json::to_vec_pretty(state).map_err(|e| QuillError::Storage {
            source: Box::new(e),
        })?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| QuillError::Storage { source: Box::new(e) })?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| QuillError::Storage { source: Box::new(e) })?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| QuillError::Storage { source: Box::new(e) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> Submission {
        Submission {
            request_id: "r1".into(),
            provisional_message_id: "m2".into(),
            triggering_message_id: "m1".into(),
            created: true,
        }
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path().join("state.json")).await.unwrap();
        assert!(store.thread("t1").await.is_none());
    }

    #[tokio::test]
    async fn entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = StateStore::open(&path).await.unwrap();
        store
            .record_pending(
                "t1",
                PendingSubmission {
                    idempotency_key: "k1".into(),
                    content: "hello".into(),
                },
            )
            .await
            .unwrap();
        store.record_submitted("t2", &submission()).await.unwrap();
        drop(store);

        let reopened = StateStore::open(&path).await.unwrap();
        let t1 = reopened.thread("t1").await.unwrap();
        assert_eq!(t1.pending.unwrap().idempotency_key, "k1");
        assert!(t1.request_id.is_none());
        let t2 = reopened.thread("t2").await.unwrap();
        assert_eq!(t2.request_id.as_deref(), Some("r1"));
        assert_eq!(t2.provisional_message_id.as_deref(), Some("m2"));
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn submitted_replaces_pending_and_clear_forgets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(&path).await.unwrap();
        store
            .record_pending(
                "t1",
                PendingSubmission {
                    idempotency_key: "k1".into(),
                    content: "hello".into(),
                },
            )
            .await
            .unwrap();
        store.record_submitted("t1", &submission()).await.unwrap();
        assert!(store.thread("t1").await.unwrap().pending.is_none());

        store.clear("t1").await.unwrap();
        assert!(store.thread("t1").await.is_none());
        let reopened = StateStore::open(&path).await.unwrap();
        assert!(reopened.thread("t1").await.is_none());
    }

    #[tokio::test]
    async fn cursor_is_scoped_to_the_recorded_request() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let store = StateStore::open(&path).await.unwrap();
        store.record_submitted("t1", &submission()).await.unwrap();
        assert_eq!(store.cursor("t1", "r1").await, 0);

        store.record_cursor("t1", "r1", 4).await.unwrap();
        store.record_cursor("t1", "r1", 2).await.unwrap();
        store.record_cursor("t1", "other", 9).await.unwrap();
        assert_eq!(store.cursor("t1", "r1").await, 4);
        assert_eq!(store.cursor("t1", "other").await, 0);

        let reopened = StateStore::open(&path).await.unwrap();
        assert_eq!(reopened.cursor("t1", "r1").await, 4);
        reopened.record_submitted("t1", &submission()).await.unwrap();
        assert_eq!(reopened.cursor("t1", "r1").await, 0);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json").unwrap();
        let err = StateStore::open(&path).await.unwrap_err();
        assert!(matches!(err, QuillError::Storage { .. }));
    }
}
