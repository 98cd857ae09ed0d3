// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background thread.
//! Do NOT create additional Connection instances for writes.

use quill_core::QuillError;
use thiserror::Error;
use tracing::debug;

use crate::migrations;

/// Error raised inside a connection closure.
///
/// Domain errors abort the surrounding transaction (it is dropped without
/// commit) and surface unchanged to the caller.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("malformed stored json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error(transparent)]
    Domain(#[from] QuillError),
}

/// Convert a tokio-rusqlite error into a [`QuillError`].
pub fn map_tr_err(err: tokio_rusqlite::Error<DbError>) -> QuillError {
    match err {
        tokio_rusqlite::Error::Error(DbError::Domain(e)) => e,
        tokio_rusqlite::Error::Error(DbError::Sqlite(e)) => QuillError::Storage {
            source: Box::new(e),
        },
        tokio_rusqlite::Error::Error(DbError::Json(e)) => QuillError::Storage {
            source: Box::new(e),
        },
        other => QuillError::Storage {
            source: other.to_string().into(),
        },
    }
}

/// Handle to the SQLite database.
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (or create) the database at `path` and run pending migrations.
    pub async fn open(path: &str) -> Result<Self, QuillError> {
        Self::open_with(path, true).await
    }

    /// Open with explicit journal mode selection.
    pub async fn open_with(path: &str, wal_mode: bool) -> Result<Self, QuillError> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| QuillError::Storage {
                    source: Box::new(e),
                })?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| QuillError::Storage {
                source: e.to_string().into(),
            })?;

        conn.call(move |conn| -> Result<(), DbError> {
            if wal_mode {
                let mode: String = conn.pragma_update_and_check(
                    None,
                    "journal_mode",
                    "WAL",
                    |row| row.get(0),
                )?;
                debug!(journal_mode = %mode, "journal mode set");
            }
            conn.execute_batch(
                "PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;",
            )?;
            migrations::run_migrations(conn)?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        debug!(path, "database opened");
        Ok(Self { conn })
    }

    /// Returns the underlying connection for query modules.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), QuillError> {
        self.conn
            .call(|conn| -> Result<(), DbError> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        self.conn.close().await.map_err(|e| QuillError::Storage {
            source: e.to_string().into(),
        })
    }
}
