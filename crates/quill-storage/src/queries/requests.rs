// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request persistence: idempotent submission and compare-and-set transitions.

use quill_core::QuillError;
use quill_core::types::{
    Checkpoint, CheckpointChange, ContentBlock, NewSubmission, Request, RequestStatus,
    RequestUpdate, Submission, TokenUsage, new_id, now_timestamp, request_id_for,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::database::{Database, DbError, map_tr_err};
use crate::queries::{optional_json_column, parse_column};

const REQUEST_COLUMNS: &str = "id, owner, idempotency_key, thread_id, triggering_message_id,
     assistant_message_id, status, progress, result_message_id, error, checkpoint,
     input_tokens, output_tokens, created_at, updated_at";

fn row_to_request(row: &Row<'_>) -> rusqlite::Result<Request> {
    Ok(Request {
        id: row.get(0)?,
        owner: row.get(1)?,
        idempotency_key: row.get(2)?,
        thread_id: row.get(3)?,
        triggering_message_id: row.get(4)?,
        assistant_message_id: row.get(5)?,
        status: parse_column(row, 6)?,
        progress: row.get(7)?,
        result_message_id: row.get(8)?,
        error: row.get(9)?,
        checkpoint: optional_json_column(row, 10)?,
        usage: TokenUsage {
            input_tokens: row.get(11)?,
            output_tokens: row.get(12)?,
        },
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

pub(crate) fn load_request(conn: &Connection, id: &str) -> rusqlite::Result<Option<Request>> {
    conn.query_row(
        &format!("SELECT {REQUEST_COLUMNS} FROM requests WHERE id = ?1"),
        params![id],
        row_to_request,
    )
    .optional()
}

/// Current status of a request, or `NotFound`.
pub(crate) fn request_status(conn: &Connection, id: &str) -> Result<RequestStatus, DbError> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT status FROM requests WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    let raw = raw.ok_or_else(|| QuillError::not_found("request", id))?;
    raw.parse::<RequestStatus>()
        .map_err(|e| DbError::Domain(QuillError::Internal(format!("bad status `{raw}`: {e}"))))
}

/// Compare-and-set status update. Must run inside the caller's transaction.
pub(crate) fn apply_transition(
    conn: &Connection,
    id: &str,
    expected: RequestStatus,
    next: RequestStatus,
    update: &RequestUpdate,
) -> Result<(), DbError> {
    if !expected.can_transition_to(next) {
        return Err(QuillError::illegal_transition("request", expected, next).into());
    }

    let (checkpoint_mode, checkpoint_json) = match &update.checkpoint {
        CheckpointChange::Keep => (0, None),
        CheckpointChange::Set(cp) => (1, Some(serde_json::to_string(cp)?)),
        CheckpointChange::Clear => (2, None),
    };
    let progress = update.progress.map(|p| p.clamp(0.0, 1.0));

    let changed = conn.execute(
        "UPDATE requests SET
            status = ?3,
            progress = MAX(progress, COALESCE(?4, progress)),
            checkpoint = CASE ?5 WHEN 0 THEN checkpoint WHEN 1 THEN ?6 ELSE NULL END,
            result_message_id = COALESCE(?7, result_message_id),
            error = COALESCE(?8, error),
            input_tokens = COALESCE(?9, input_tokens),
            output_tokens = COALESCE(?10, output_tokens),
            updated_at = ?11
         WHERE id = ?1 AND status = ?2",
        params![
            id,
            expected.to_string(),
            next.to_string(),
            progress,
            checkpoint_mode,
            checkpoint_json,
            update.result_message_id,
            update.error,
            update.usage.map(|u| u.input_tokens),
            update.usage.map(|u| u.output_tokens),
            now_timestamp(),
        ],
    )?;

    if changed == 0 {
        let current = request_status(conn, id)?;
        return Err(QuillError::illegal_transition("request", current, next).into());
    }
    Ok(())
}

/// Create a request and its triggering user message, or return the request
/// already registered for this (owner, idempotency key).
pub async fn submit(db: &Database, submission: &NewSubmission) -> Result<Submission, QuillError> {
    if submission.idempotency_key.trim().is_empty() {
        return Err(QuillError::Validation("idempotency key is required".into()));
    }
    if submission.thread_id.trim().is_empty() {
        return Err(QuillError::Validation("thread id is required".into()));
    }
    if submission.content.trim().is_empty() {
        return Err(QuillError::Validation("message content is empty".into()));
    }

    let sub = submission.clone();
    db.connection()
        .call(move |conn| -> Result<Submission, DbError> {
            let tx = conn.transaction()?;
            let id = request_id_for(&sub.owner, &sub.idempotency_key);

            if let Some(existing) = load_request(&tx, &id)? {
                return Ok(Submission {
                    request_id: existing.id,
                    provisional_message_id: existing.assistant_message_id,
                    triggering_message_id: existing.triggering_message_id,
                    created: false,
                });
            }

            let now = now_timestamp();
            let user_message_id = new_id();
            let assistant_message_id = new_id();
            let blocks = serde_json::to_string(&[ContentBlock::Text {
                text: sub.content.clone(),
            }])?;

            tx.execute(
                "INSERT INTO messages (id, thread_id, request_id, role, status, blocks, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 'user', 'complete', ?4, ?5, ?5)",
                params![user_message_id, sub.thread_id, id, blocks, now],
            )?;
            tx.execute(
                "INSERT INTO requests (id, owner, idempotency_key, thread_id, triggering_message_id,
                                       assistant_message_id, status, progress, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0.0, ?7, ?7)",
                params![
                    id,
                    sub.owner,
                    sub.idempotency_key,
                    sub.thread_id,
                    user_message_id,
                    assistant_message_id,
                    now,
                ],
            )?;
            tx.commit()?;

            Ok(Submission {
                request_id: id,
                provisional_message_id: assistant_message_id,
                triggering_message_id: user_message_id,
                created: true,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Get a request by ID.
pub async fn get_request(db: &Database, id: &str) -> Result<Option<Request>, QuillError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Request>, DbError> { Ok(load_request(conn, &id)?) })
        .await
        .map_err(map_tr_err)
}

/// List requests, optionally filtered by status, oldest first.
pub async fn list_requests(
    db: &Database,
    status: Option<RequestStatus>,
) -> Result<Vec<Request>, QuillError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| -> Result<Vec<Request>, DbError> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM requests
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map(params![status], row_to_request)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Move a request from `expected` to `next`, applying `update`.
pub async fn transition(
    db: &Database,
    id: &str,
    expected: RequestStatus,
    next: RequestStatus,
    update: RequestUpdate,
) -> Result<Request, QuillError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Request, DbError> {
            let tx = conn.transaction()?;
            apply_transition(&tx, &id, expected, next, &update)?;
            let request =
                load_request(&tx, &id)?.ok_or_else(|| QuillError::not_found("request", &id))?;
            tx.commit()?;
            Ok(request)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove and return the checkpoint of an in-progress request.
pub async fn take_checkpoint(db: &Database, id: &str) -> Result<Option<Checkpoint>, QuillError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<Checkpoint>, DbError> {
            let tx = conn.transaction()?;
            let request =
                load_request(&tx, &id)?.ok_or_else(|| QuillError::not_found("request", &id))?;
            if request.status != RequestStatus::InProgress || request.checkpoint.is_none() {
                return Ok(None);
            }
            tx.execute(
                "UPDATE requests SET checkpoint = NULL, updated_at = ?2 WHERE id = ?1",
                params![id, now_timestamp()],
            )?;
            tx.commit()?;
            Ok(request.checkpoint)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::messages;
    use quill_core::types::MessageRole;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    fn submission(key: &str) -> NewSubmission {
        NewSubmission {
            owner: "alice".into(),
            idempotency_key: key.into(),
            thread_id: "thread-1".into(),
            content: "Say hello".into(),
        }
    }

    #[tokio::test]
    async fn submit_creates_request_and_user_message() {
        let (db, _dir) = setup_db().await;

        let sub = submit(&db, &submission("k1")).await.unwrap();
        assert!(sub.created);
        assert_eq!(sub.request_id, request_id_for("alice", "k1"));

        let request = get_request(&db, &sub.request_id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.progress, 0.0);
        assert_eq!(request.assistant_message_id, sub.provisional_message_id);

        let user = messages::get_message(&db, &sub.triggering_message_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.role, MessageRole::User);
        assert_eq!(user.text(), "Say hello");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn resubmitting_same_key_is_idempotent() {
        let (db, _dir) = setup_db().await;

        let first = submit(&db, &submission("k1")).await.unwrap();
        let second = submit(&db, &submission("k1")).await.unwrap();
        assert!(!second.created);
        assert_eq!(first.request_id, second.request_id);
        assert_eq!(first.provisional_message_id, second.provisional_message_id);

        let all = list_requests(&db, None).await.unwrap();
        assert_eq!(all.len(), 1, "exactly one request per key");
        let thread = messages::list_thread_messages(&db, "thread-1").await.unwrap();
        assert_eq!(thread.len(), 1, "no duplicate user message");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn submit_rejects_empty_content() {
        let (db, _dir) = setup_db().await;
        let mut sub = submission("k1");
        sub.content = "   ".into();
        let err = submit(&db, &sub).await.unwrap_err();
        assert!(matches!(err, QuillError::Validation(_)));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let (db, _dir) = setup_db().await;
        let sub = submit(&db, &submission("k1")).await.unwrap();

        let claimed = transition(
            &db,
            &sub.request_id,
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestUpdate::progress(0.1),
        )
        .await
        .unwrap();
        assert_eq!(claimed.status, RequestStatus::InProgress);

        let err = transition(
            &db,
            &sub.request_id,
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestUpdate::default(),
        )
        .await
        .unwrap_err();
        assert!(
            matches!(err, QuillError::IllegalTransition { ref from, .. } if from == "in_progress"),
            "second claim must lose, got {err:?}"
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn progress_never_decreases() {
        let (db, _dir) = setup_db().await;
        let sub = submit(&db, &submission("k1")).await.unwrap();
        let id = sub.request_id;

        transition(
            &db,
            &id,
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestUpdate::progress(0.6),
        )
        .await
        .unwrap();
        let after = transition(
            &db,
            &id,
            RequestStatus::InProgress,
            RequestStatus::InProgress,
            RequestUpdate::progress(0.2),
        )
        .await
        .unwrap();
        assert_eq!(after.progress, 0.6);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_requests_reject_transitions() {
        let (db, _dir) = setup_db().await;
        let sub = submit(&db, &submission("k1")).await.unwrap();
        let id = sub.request_id;

        transition(
            &db,
            &id,
            RequestStatus::Pending,
            RequestStatus::Failed,
            RequestUpdate::failure("denied"),
        )
        .await
        .unwrap();

        let err = transition(
            &db,
            &id,
            RequestStatus::Failed,
            RequestStatus::InProgress,
            RequestUpdate::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuillError::IllegalTransition { .. }));

        let request = get_request(&db, &id).await.unwrap().unwrap();
        assert_eq!(request.error.as_deref(), Some("denied"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn take_checkpoint_succeeds_once() {
        let (db, _dir) = setup_db().await;
        let sub = submit(&db, &submission("k1")).await.unwrap();
        let id = sub.request_id;
        let checkpoint = Checkpoint {
            accumulated_text: "partial".into(),
            transcript: Vec::new(),
            pending_tool_call_id: "tc1".into(),
            usage: TokenUsage::default(),
            round: 0,
        };

        transition(
            &db,
            &id,
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestUpdate {
                checkpoint: CheckpointChange::Set(Box::new(checkpoint.clone())),
                ..RequestUpdate::default()
            },
        )
        .await
        .unwrap();

        let first = take_checkpoint(&db, &id).await.unwrap();
        let second = take_checkpoint(&db, &id).await.unwrap();
        assert_eq!(first, Some(checkpoint));
        assert!(second.is_none(), "checkpoint can only be claimed once");
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_request_is_not_found() {
        let (db, _dir) = setup_db().await;
        let err = transition(
            &db,
            "missing",
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestUpdate::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuillError::NotFound { .. }));
        db.close().await.unwrap();
    }
}
