// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only execution event log.
//!
//! Sequence numbers are assigned inside the appending transaction as
//! `MAX(seq) + 1`, so they are gap-free per request. Nothing is appended
//! after a terminal event.

use std::str::FromStr;

use quill_core::QuillError;
use quill_core::types::{
    ApprovalStatus, Checkpoint, CheckpointChange, EventKind, EventPayload, ExecutionEvent,
    RequestStatus, RequestUpdate, ToolCall, now_timestamp,
};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::database::{Database, DbError, map_tr_err};
use crate::queries::json_column;
use crate::queries::requests::{apply_transition, request_status};
use crate::queries::tool_calls::insert_tool_call;

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<ExecutionEvent> {
    Ok(ExecutionEvent {
        request_id: row.get(0)?,
        seq: row.get(1)?,
        payload: json_column(row, 2)?,
        created_at: row.get(3)?,
    })
}

/// Insert the next event for a request. Runs inside the caller's transaction.
pub(crate) fn insert_event(
    conn: &Connection,
    request_id: &str,
    payload: &EventPayload,
) -> Result<ExecutionEvent, DbError> {
    payload.validate()?;

    let last: Option<(i64, String)> = conn
        .query_row(
            "SELECT seq, kind FROM events WHERE request_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![request_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((_, kind)) = &last {
        let terminal = EventKind::from_str(kind)
            .map(EventKind::is_terminal)
            .unwrap_or(false);
        if terminal {
            return Err(QuillError::illegal_transition("event log", kind, payload.kind()).into());
        }
    }

    let seq = last.map(|(seq, _)| seq).unwrap_or(0) + 1;
    let created_at = now_timestamp();
    conn.execute(
        "INSERT INTO events (request_id, seq, kind, payload, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            request_id,
            seq,
            payload.kind().to_string(),
            serde_json::to_string(payload)?,
            created_at,
        ],
    )?;

    Ok(ExecutionEvent {
        request_id: request_id.to_string(),
        seq,
        created_at,
        payload: payload.clone(),
    })
}

/// Append a non-terminal event to an in-progress request.
pub async fn append_event(
    db: &Database,
    request_id: &str,
    payload: &EventPayload,
) -> Result<ExecutionEvent, QuillError> {
    if payload.is_terminal() {
        return Err(QuillError::Validation(format!(
            "{} events must be appended with finish_request",
            payload.kind()
        )));
    }

    let request_id = request_id.to_string();
    let payload = payload.clone();
    db.connection()
        .call(move |conn| -> Result<ExecutionEvent, DbError> {
            let tx = conn.transaction()?;
            let status = request_status(&tx, &request_id)?;
            if status != RequestStatus::InProgress {
                return Err(QuillError::illegal_transition(
                    "request",
                    status,
                    format!("append {}", payload.kind()),
                )
                .into());
            }
            let event = insert_event(&tx, &request_id, &payload)?;
            tx.commit()?;
            Ok(event)
        })
        .await
        .map_err(map_tr_err)
}

/// Append a terminal event and settle the request status in one transaction.
pub async fn finish_request(
    db: &Database,
    request_id: &str,
    expected: RequestStatus,
    payload: &EventPayload,
    update: RequestUpdate,
) -> Result<ExecutionEvent, QuillError> {
    let next = payload.terminal_status().ok_or_else(|| {
        QuillError::Validation(format!("{} is not a terminal event", payload.kind()))
    })?;

    let request_id = request_id.to_string();
    let payload = payload.clone();
    db.connection()
        .call(move |conn| -> Result<ExecutionEvent, DbError> {
            let tx = conn.transaction()?;
            apply_transition(&tx, &request_id, expected, next, &update)?;
            let event = insert_event(&tx, &request_id, &payload)?;
            tx.commit()?;
            Ok(event)
        })
        .await
        .map_err(map_tr_err)
}

/// Persist a pending tool call, its `tool_call` event, and the checkpoint atomically.
pub async fn suspend_for_approval(
    db: &Database,
    tool_call: &ToolCall,
    checkpoint: &Checkpoint,
) -> Result<ExecutionEvent, QuillError> {
    if tool_call.status != ApprovalStatus::Pending {
        return Err(QuillError::Validation(
            "a suspended tool call must be pending".into(),
        ));
    }

    let tool_call = tool_call.clone();
    let checkpoint = checkpoint.clone();
    db.connection()
        .call(move |conn| -> Result<ExecutionEvent, DbError> {
            let tx = conn.transaction()?;
            let update = RequestUpdate {
                checkpoint: CheckpointChange::Set(Box::new(checkpoint)),
                ..RequestUpdate::default()
            };
            apply_transition(
                &tx,
                &tool_call.request_id,
                RequestStatus::InProgress,
                RequestStatus::InProgress,
                &update,
            )?;
            insert_tool_call(&tx, &tool_call)?;
            let event = insert_event(
                &tx,
                &tool_call.request_id,
                &EventPayload::ToolCall {
                    tool_call_id: tool_call.id.clone(),
                    name: tool_call.name.clone(),
                    input: tool_call.input.clone(),
                    message_id: tool_call.message_id.clone(),
                },
            )?;
            tx.commit()?;
            Ok(event)
        })
        .await
        .map_err(map_tr_err)
}

/// Events with `seq > after_seq` in ascending order.
pub async fn list_events(
    db: &Database,
    request_id: &str,
    after_seq: i64,
) -> Result<Vec<ExecutionEvent>, QuillError> {
    let request_id = request_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ExecutionEvent>, DbError> {
            request_status(conn, &request_id)?;
            let mut stmt = conn.prepare(
                "SELECT request_id, seq, payload, created_at FROM events
                 WHERE request_id = ?1 AND seq > ?2
                 ORDER BY seq ASC",
            )?;
            let events = stmt
                .query_map(params![request_id, after_seq], row_to_event)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(events)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::{requests, tool_calls};
    use quill_core::types::{NewSubmission, TokenUsage};
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir, String) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("test.db").to_str().unwrap())
            .await
            .unwrap();
        let sub = requests::submit(
            &db,
            &NewSubmission {
                owner: "alice".into(),
                idempotency_key: "k1".into(),
                thread_id: "t1".into(),
                content: "hi".into(),
            },
        )
        .await
        .unwrap();
        requests::transition(
            &db,
            &sub.request_id,
            RequestStatus::Pending,
            RequestStatus::InProgress,
            RequestUpdate::default(),
        )
        .await
        .unwrap();
        (db, dir, sub.request_id)
    }

    fn chunk(text: &str) -> EventPayload {
        EventPayload::TextChunk { text: text.into() }
    }

    #[tokio::test]
    async fn sequence_numbers_are_gap_free() {
        let (db, _dir, id) = setup().await;

        for text in ["a", "b", "c"] {
            append_event(&db, &id, &chunk(text)).await.unwrap();
        }
        let events = list_events(&db, &id, 0).await.unwrap();
        let seqs: Vec<i64> = events.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);

        let tail = list_events(&db, &id, 2).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].payload, chunk("c"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn finish_settles_status_and_blocks_further_appends() {
        let (db, _dir, id) = setup().await;
        append_event(&db, &id, &chunk("Hello")).await.unwrap();

        let done = finish_request(
            &db,
            &id,
            RequestStatus::InProgress,
            &EventPayload::Completion {
                message_id: "m1".into(),
                usage: TokenUsage::default(),
            },
            RequestUpdate::progress(1.0),
        )
        .await
        .unwrap();
        assert_eq!(done.seq, 2);

        let request = requests::get_request(&db, &id).await.unwrap().unwrap();
        assert_eq!(request.status, RequestStatus::Completed);
        assert_eq!(request.progress, 1.0);

        let err = append_event(&db, &id, &chunk("late")).await.unwrap_err();
        assert!(matches!(err, QuillError::IllegalTransition { .. }));

        let err = finish_request(
            &db,
            &id,
            RequestStatus::InProgress,
            &EventPayload::Error {
                message: "again".into(),
            },
            RequestUpdate::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuillError::IllegalTransition { .. }));
        assert_eq!(list_events(&db, &id, 0).await.unwrap().len(), 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn terminal_payloads_are_refused_by_append() {
        let (db, _dir, id) = setup().await;
        let err = append_event(
            &db,
            &id,
            &EventPayload::Error {
                message: "x".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, QuillError::Validation(_)));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_payload_is_refused() {
        let (db, _dir, id) = setup().await;
        let err = append_event(&db, &id, &chunk("")).await.unwrap_err();
        assert!(matches!(err, QuillError::Validation(_)));
        assert!(list_events(&db, &id, 0).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn suspend_records_tool_call_event_and_checkpoint() {
        let (db, _dir, id) = setup().await;
        let tool_call = ToolCall {
            id: "tc1".into(),
            request_id: id.clone(),
            message_id: "m1".into(),
            name: "write_file".into(),
            input: serde_json::json!({"path": "notes.txt"}),
            status: ApprovalStatus::Pending,
            reason: None,
            output: None,
            revision: 0,
            created_at: now_timestamp(),
            decided_at: None,
        };
        let checkpoint = Checkpoint {
            accumulated_text: String::new(),
            transcript: Vec::new(),
            pending_tool_call_id: "tc1".into(),
            usage: TokenUsage::default(),
            round: 0,
        };

        let event = suspend_for_approval(&db, &tool_call, &checkpoint)
            .await
            .unwrap();
        assert_eq!(event.payload.kind(), EventKind::ToolCall);

        let stored = tool_calls::get_tool_call(&db, "tc1").await.unwrap().unwrap();
        assert_eq!(stored.status, ApprovalStatus::Pending);
        let request = requests::get_request(&db, &id).await.unwrap().unwrap();
        assert_eq!(request.checkpoint, Some(checkpoint.clone()));

        let second = ToolCall {
            id: "tc2".into(),
            ..tool_call
        };
        let err = suspend_for_approval(&db, &second, &checkpoint)
            .await
            .unwrap_err();
        assert!(
            matches!(err, QuillError::IllegalTransition { .. }),
            "only one pending tool call per request, got {err:?}"
        );
        assert_eq!(list_events(&db, &id, 0).await.unwrap().len(), 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn listing_unknown_request_is_not_found() {
        let (db, _dir, _id) = setup().await;
        let err = list_events(&db, "missing", 0).await.unwrap_err();
        assert!(matches!(err, QuillError::NotFound { .. }));
        db.close().await.unwrap();
    }
}
