// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use quill_config::model::StorageConfig;
use quill_core::types::{
    AdapterType, ApprovalStatus, Checkpoint, ContentBlock, EventPayload, ExecutionEvent,
    HealthStatus, Message, MessageStatus, NewSubmission, Request, RequestStatus, RequestUpdate,
    Submission, ToolCall,
};
use quill_core::{PluginAdapter, QuillError, StorageAdapter};

use crate::database::{Database, DbError, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is opened on the first call to
/// [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, QuillError> {
        self.db.get().ok_or_else(|| QuillError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint_wal(&self) -> Result<(), QuillError> {
        if let Some(db) = self.db.get() {
            db.connection()
                .call(|conn| -> Result<(), DbError> {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, QuillError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), DbError> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), QuillError> {
        let path = self.config.database_path.clone();
        let db = Database::open_with(&path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| QuillError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), QuillError> {
        self.db()?;
        self.checkpoint_wal().await
    }

    // --- Requests ---

    async fn submit(&self, submission: &NewSubmission) -> Result<Submission, QuillError> {
        queries::requests::submit(self.db()?, submission).await
    }

    async fn get_request(&self, id: &str) -> Result<Option<Request>, QuillError> {
        queries::requests::get_request(self.db()?, id).await
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> Result<Vec<Request>, QuillError> {
        queries::requests::list_requests(self.db()?, status).await
    }

    async fn transition(
        &self,
        id: &str,
        expected: RequestStatus,
        next: RequestStatus,
        update: RequestUpdate,
    ) -> Result<Request, QuillError> {
        queries::requests::transition(self.db()?, id, expected, next, update).await
    }

    async fn take_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>, QuillError> {
        queries::requests::take_checkpoint(self.db()?, id).await
    }

    // --- Events ---

    async fn append_event(
        &self,
        request_id: &str,
        payload: &EventPayload,
    ) -> Result<ExecutionEvent, QuillError> {
        queries::events::append_event(self.db()?, request_id, payload).await
    }

    async fn finish_request(
        &self,
        request_id: &str,
        expected: RequestStatus,
        payload: &EventPayload,
        update: RequestUpdate,
    ) -> Result<ExecutionEvent, QuillError> {
        queries::events::finish_request(self.db()?, request_id, expected, payload, update).await
    }

    async fn suspend_for_approval(
        &self,
        tool_call: &ToolCall,
        checkpoint: &Checkpoint,
    ) -> Result<ExecutionEvent, QuillError> {
        queries::events::suspend_for_approval(self.db()?, tool_call, checkpoint).await
    }

    async fn list_events(
        &self,
        request_id: &str,
        after_seq: i64,
    ) -> Result<Vec<ExecutionEvent>, QuillError> {
        queries::events::list_events(self.db()?, request_id, after_seq).await
    }

    // --- Tool calls ---

    async fn get_tool_call(&self, id: &str) -> Result<Option<ToolCall>, QuillError> {
        queries::tool_calls::get_tool_call(self.db()?, id).await
    }

    async fn list_tool_calls(&self, request_id: &str) -> Result<Vec<ToolCall>, QuillError> {
        queries::tool_calls::list_tool_calls(self.db()?, request_id).await
    }

    async fn decide_tool_call(
        &self,
        id: &str,
        decision: ApprovalStatus,
        reason: Option<&str>,
    ) -> Result<ToolCall, QuillError> {
        queries::tool_calls::decide_tool_call(self.db()?, id, decision, reason).await
    }

    async fn record_tool_output(&self, id: &str, output: &str) -> Result<(), QuillError> {
        queries::tool_calls::record_tool_output(self.db()?, id, output).await
    }

    async fn list_stale_tool_calls(&self, cutoff: &str) -> Result<Vec<ToolCall>, QuillError> {
        queries::tool_calls::list_stale_tool_calls(self.db()?, cutoff).await
    }

    // --- Messages ---

    async fn insert_message(&self, message: &Message) -> Result<(), QuillError> {
        queries::messages::insert_message(self.db()?, message).await
    }

    async fn get_message(&self, id: &str) -> Result<Option<Message>, QuillError> {
        queries::messages::get_message(self.db()?, id).await
    }

    async fn update_message(
        &self,
        id: &str,
        blocks: &[ContentBlock],
        status: MessageStatus,
    ) -> Result<(), QuillError> {
        queries::messages::update_message(self.db()?, id, blocks, status).await
    }

    async fn list_thread_messages(&self, thread_id: &str) -> Result<Vec<Message>, QuillError> {
        queries::messages::list_thread_messages(self.db()?, thread_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            wal_mode: true,
        }
    }

    #[tokio::test]
    async fn sqlite_storage_implements_plugin_adapter() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        assert_eq!(storage.name(), "sqlite");
        assert_eq!(storage.version(), semver::Version::new(0, 1, 0));
        assert_eq!(storage.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_opens_database_at_configured_path() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("init_test.db");
        let storage = SqliteStorage::new(make_config(db_path.to_str().unwrap()));

        storage.initialize().await.unwrap();
        assert!(db_path.exists(), "database file should be created");
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.close().await.unwrap();
    }

    #[tokio::test]
    async fn operations_before_initialize_fail() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(
            dir.path().join("x.db").to_str().unwrap(),
        ));
        let err = storage.get_request("r1").await.unwrap_err();
        assert!(matches!(err, QuillError::Storage { .. }));
    }

    #[tokio::test]
    async fn double_initialize_fails() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new(make_config(
            dir.path().join("x.db").to_str().unwrap(),
        ));
        storage.initialize().await.unwrap();
        assert!(storage.initialize().await.is_err());
    }

    #[tokio::test]
    async fn submission_round_trip_through_trait_object() {
        let dir = tempdir().unwrap();
        let storage: std::sync::Arc<dyn StorageAdapter> = std::sync::Arc::new(
            SqliteStorage::new(make_config(dir.path().join("x.db").to_str().unwrap())),
        );
        storage.initialize().await.unwrap();

        let sub = storage
            .submit(&NewSubmission {
                owner: "alice".into(),
                idempotency_key: "k".into(),
                thread_id: "t".into(),
                content: "hello".into(),
            })
            .await
            .unwrap();
        let status = storage
            .get_request(&sub.request_id)
            .await
            .unwrap()
            .unwrap()
            .status_view();
        assert_eq!(status.status, RequestStatus::Pending);
        assert!(status.result_message_id.is_none());
    }
}
