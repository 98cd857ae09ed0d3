// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message CRUD operations.

use quill_core::QuillError;
use quill_core::types::{ContentBlock, Message, MessageStatus, now_timestamp};
use rusqlite::{OptionalExtension, Row, params};

use crate::database::{Database, DbError, map_tr_err};
use crate::queries::{json_column, parse_column};

const MESSAGE_COLUMNS: &str =
    "id, thread_id, request_id, role, status, blocks, created_at, updated_at";

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        request_id: row.get(2)?,
        role: parse_column(row, 3)?,
        status: parse_column(row, 4)?,
        blocks: json_column(row, 5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Insert a new message.
pub async fn insert_message(db: &Database, msg: &Message) -> Result<(), QuillError> {
    let msg = msg.clone();
    db.connection()
        .call(move |conn| -> Result<(), DbError> {
            conn.execute(
                "INSERT INTO messages (id, thread_id, request_id, role, status, blocks, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    msg.id,
                    msg.thread_id,
                    msg.request_id,
                    msg.role.to_string(),
                    msg.status.to_string(),
                    serde_json::to_string(&msg.blocks)?,
                    msg.created_at,
                    msg.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Get a message by ID.
pub async fn get_message(db: &Database, id: &str) -> Result<Option<Message>, QuillError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Message>, DbError> {
            let msg = conn
                .query_row(
                    &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                    params![id],
                    row_to_message,
                )
                .optional()?;
            Ok(msg)
        })
        .await
        .map_err(map_tr_err)
}

/// Replace a message's blocks and status.
pub async fn update_message(
    db: &Database,
    id: &str,
    blocks: &[ContentBlock],
    status: MessageStatus,
) -> Result<(), QuillError> {
    let id = id.to_string();
    let blocks = serde_json::to_string(blocks).map_err(|e| QuillError::Storage {
        source: Box::new(e),
    })?;
    db.connection()
        .call(move |conn| -> Result<(), DbError> {
            let changed = conn.execute(
                "UPDATE messages SET blocks = ?2, status = ?3, updated_at = ?4 WHERE id = ?1",
                params![id, blocks, status.to_string(), now_timestamp()],
            )?;
            if changed == 0 {
                return Err(QuillError::not_found("message", &id).into());
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Messages of a thread in insertion order.
pub async fn list_thread_messages(db: &Database, thread_id: &str) -> Result<Vec<Message>, QuillError> {
    let thread_id = thread_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<Message>, DbError> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE thread_id = ?1 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map(params![thread_id], row_to_message)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::types::MessageRole;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    fn assistant(id: &str, created_at: &str) -> Message {
        Message {
            id: id.into(),
            thread_id: "t1".into(),
            request_id: Some("r1".into()),
            role: MessageRole::Assistant,
            status: MessageStatus::Streaming,
            blocks: Vec::new(),
            created_at: created_at.into(),
            updated_at: created_at.into(),
        }
    }

    #[tokio::test]
    async fn insert_update_and_read_back() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &assistant("m1", "2026-01-01T00:00:00.000Z"))
            .await
            .unwrap();

        let blocks = vec![
            ContentBlock::Text {
                text: "Hello world!".into(),
            },
            ContentBlock::ToolUse {
                id: "tc1".into(),
                name: "write_file".into(),
                input: serde_json::json!({"path": "a.txt"}),
            },
        ];
        update_message(&db, "m1", &blocks, MessageStatus::Complete)
            .await
            .unwrap();

        let stored = get_message(&db, "m1").await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Complete);
        assert_eq!(stored.blocks, blocks);
        assert_eq!(stored.text(), "Hello world!");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn thread_listing_is_chronological() {
        let (db, _dir) = setup_db().await;
        insert_message(&db, &assistant("late", "2026-01-01T00:00:02.000Z"))
            .await
            .unwrap();
        insert_message(&db, &assistant("early", "2026-01-01T00:00:01.000Z"))
            .await
            .unwrap();

        let ids: Vec<String> = list_thread_messages(&db, "t1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["early", "late"]);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn updating_missing_message_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = update_message(&db, "nope", &[], MessageStatus::Complete)
            .await
            .unwrap_err();
        assert!(matches!(err, QuillError::NotFound { .. }));
        assert!(get_message(&db, "nope").await.unwrap().is_none());
        db.close().await.unwrap();
    }
}
