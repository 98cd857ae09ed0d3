// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Server-Sent Events for `GET /v1/requests/{id}/stream`.
//!
//! Each execution event becomes one SSE event:
//! ```text
//! id: 3
//! event: text_chunk
//! data: {"request_id":"...","seq":3,"created_at":"...","payload":{"type":"text_chunk","text":"Hi"}}
//! ```
//! The stream replays everything after the cursor (`?after=N` or the
//! `Last-Event-ID` header), follows live events, and ends after the
//! terminal event.

use std::convert::Infallible;

use axum::extract::{Extension, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::{Stream, StreamExt};
use quill_core::api::{ErrorResponse, STREAM_ERROR_EVENT};
use quill_core::{ExecutionEvent, QuillError};

use crate::auth::CallerIdentity;
use crate::error::ApiError;
use crate::handlers::EventsQuery;
use crate::server::GatewayState;

/// GET /v1/requests/{id}/stream
pub async fn stream_events(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let after = match query.after {
        Some(after) => after,
        None => last_event_id(&headers)?,
    };
    let events = state.runtime.attach(&caller.user, &id, after).await?;
    tracing::debug!(request_id = %id, after, "sse stream attached");

    let stream = events
        .map(|item| Ok(to_sse(item)))
        .take_until(state.shutdown.clone().cancelled_owned());
    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive).text("keepalive")))
}

fn last_event_id(headers: &HeaderMap) -> Result<i64, ApiError> {
    match headers.get("last-event-id").and_then(|v| v.to_str().ok()) {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| ApiError::bad_request(format!("invalid Last-Event-ID `{raw}`"))),
    }
}

fn to_sse(item: Result<ExecutionEvent, QuillError>) -> Event {
    match item {
        Ok(event) => {
            let base = Event::default()
                .id(event.seq.to_string())
                .event(event.payload.kind().to_string());
            match serde_json::to_string(&event) {
                Ok(data) => base.data(data),
                Err(e) => error_event(&QuillError::Internal(format!("event encoding failed: {e}"))),
            }
        }
        Err(err) => {
            tracing::warn!(error = %err, "sse stream failed");
            error_event(&err)
        }
    }
}

fn error_event(err: &QuillError) -> Event {
    let body = ErrorResponse {
        error: err.to_string(),
        code: err.code().to_string(),
    };
    let data = serde_json::to_string(&body).unwrap_or_else(|_| err.to_string());
    Event::default().event(STREAM_ERROR_EVENT).data(data)
}
