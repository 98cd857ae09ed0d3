// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool call persistence and approval decisions.

use quill_core::QuillError;
use quill_core::types::{ApprovalStatus, ToolCall, now_timestamp};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::database::{Database, DbError, map_tr_err};
use crate::queries::requests::request_status;
use crate::queries::{json_column, parse_column};

const TOOL_CALL_COLUMNS: &str = "id, request_id, message_id, name, input, status, reason, output,
     revision, created_at, decided_at";

fn row_to_tool_call(row: &Row<'_>) -> rusqlite::Result<ToolCall> {
    Ok(ToolCall {
        id: row.get(0)?,
        request_id: row.get(1)?,
        message_id: row.get(2)?,
        name: row.get(3)?,
        input: json_column(row, 4)?,
        status: parse_column(row, 5)?,
        reason: row.get(6)?,
        output: row.get(7)?,
        revision: row.get(8)?,
        created_at: row.get(9)?,
        decided_at: row.get(10)?,
    })
}

fn load_tool_call(conn: &Connection, id: &str) -> rusqlite::Result<Option<ToolCall>> {
    conn.query_row(
        &format!("SELECT {TOOL_CALL_COLUMNS} FROM tool_calls WHERE id = ?1"),
        params![id],
        row_to_tool_call,
    )
    .optional()
}

/// Insert a pending tool call. At most one may be pending per request.
pub(crate) fn insert_tool_call(conn: &Connection, tool_call: &ToolCall) -> Result<(), DbError> {
    let pending: Option<String> = conn
        .query_row(
            "SELECT id FROM tool_calls WHERE request_id = ?1 AND status = 'pending'",
            params![tool_call.request_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(existing) = pending {
        return Err(QuillError::illegal_transition(
            "tool call",
            format!("{existing} pending"),
            format!("{} pending", tool_call.id),
        )
        .into());
    }

    conn.execute(
        "INSERT INTO tool_calls (id, request_id, message_id, name, input, status, reason, output,
                                 revision, created_at, decided_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            tool_call.id,
            tool_call.request_id,
            tool_call.message_id,
            tool_call.name,
            serde_json::to_string(&tool_call.input)?,
            tool_call.status.to_string(),
            tool_call.reason,
            tool_call.output,
            tool_call.revision,
            tool_call.created_at,
            tool_call.decided_at,
        ],
    )?;
    Ok(())
}

/// Get a tool call by ID.
pub async fn get_tool_call(db: &Database, id: &str) -> Result<Option<ToolCall>, QuillError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ToolCall>, DbError> { Ok(load_tool_call(conn, &id)?) })
        .await
        .map_err(map_tr_err)
}

/// All tool calls of a request in creation order.
pub async fn list_tool_calls(db: &Database, request_id: &str) -> Result<Vec<ToolCall>, QuillError> {
    let request_id = request_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ToolCall>, DbError> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TOOL_CALL_COLUMNS} FROM tool_calls
                 WHERE request_id = ?1 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map(params![request_id], row_to_tool_call)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Decide a pending tool call.
///
/// Fails with `IllegalTransition` when the owning request is already
/// terminal, and with `AlreadyDecided` when another decision won.
pub async fn decide_tool_call(
    db: &Database,
    id: &str,
    decision: ApprovalStatus,
    reason: Option<&str>,
) -> Result<ToolCall, QuillError> {
    if !decision.is_decided() {
        return Err(QuillError::Validation(
            "a decision must approve, reject, or time out".into(),
        ));
    }

    let id = id.to_string();
    let reason = reason.map(str::to_string);
    db.connection()
        .call(move |conn| -> Result<ToolCall, DbError> {
            let tx = conn.transaction()?;
            let current =
                load_tool_call(&tx, &id)?.ok_or_else(|| QuillError::not_found("tool call", &id))?;

            let request = request_status(&tx, &current.request_id)?;
            if request.is_terminal() {
                return Err(QuillError::illegal_transition("request", request, decision).into());
            }
            if current.status.is_decided() {
                return Err(QuillError::AlreadyDecided {
                    tool_call_id: id,
                    status: current.status.to_string(),
                }
                .into());
            }

            let changed = tx.execute(
                "UPDATE tool_calls
                 SET status = ?2, reason = ?3, revision = revision + 1, decided_at = ?4
                 WHERE id = ?1 AND status = 'pending' AND revision = ?5",
                params![
                    id,
                    decision.to_string(),
                    reason,
                    now_timestamp(),
                    current.revision
                ],
            )?;
            if changed == 0 {
                return Err(QuillError::AlreadyDecided {
                    tool_call_id: id,
                    status: "unknown".into(),
                }
                .into());
            }

            let decided =
                load_tool_call(&tx, &id)?.ok_or_else(|| QuillError::not_found("tool call", &id))?;
            tx.commit()?;
            Ok(decided)
        })
        .await
        .map_err(map_tr_err)
}

/// Record what an executed tool returned.
pub async fn record_tool_output(db: &Database, id: &str, output: &str) -> Result<(), QuillError> {
    let id = id.to_string();
    let output = output.to_string();
    db.connection()
        .call(move |conn| -> Result<(), DbError> {
            let changed = conn.execute(
                "UPDATE tool_calls SET output = ?2, revision = revision + 1 WHERE id = ?1",
                params![id, output],
            )?;
            if changed == 0 {
                return Err(QuillError::not_found("tool call", &id).into());
            }
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Pending tool calls created strictly before `cutoff`.
pub async fn list_stale_tool_calls(db: &Database, cutoff: &str) -> Result<Vec<ToolCall>, QuillError> {
    let cutoff = cutoff.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<ToolCall>, DbError> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TOOL_CALL_COLUMNS} FROM tool_calls
                 WHERE status = 'pending' AND created_at < ?1
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map(params![cutoff], row_to_tool_call)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}
