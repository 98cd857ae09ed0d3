// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway REST API.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use quill_core::api::{
    HealthResponse, IDEMPOTENCY_KEY_HEADER, RejectBody, SubmitBody, SubmitResponse,
};
use quill_core::types::{Message, StatusView, ToolCall};
use quill_core::{ExecutionEvent, HealthStatus};
use serde::Deserialize;

use crate::auth::CallerIdentity;
use crate::error::ApiError;
use crate::server::GatewayState;

/// `?after=N` cursor for event reads.
#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    #[serde(default)]
    pub after: Option<i64>,
}

/// POST /v1/requests
///
/// Returns 202 for a new request and 200 when the idempotency key matched
/// an earlier submission.
pub async fn post_request(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    headers: HeaderMap,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| ApiError::bad_request("Idempotency-Key header is required"))?;

    let submission = state
        .runtime
        .submit(&caller.user, key, &body.thread_id, &body.content)
        .await?;
    let status = if submission.created {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(SubmitResponse {
            request_id: submission.request_id,
            provisional_message_id: submission.provisional_message_id,
            triggering_message_id: submission.triggering_message_id,
            created: submission.created,
        }),
    ))
}

/// GET /v1/requests/{id}
pub async fn get_request(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<Json<StatusView>, ApiError> {
    Ok(Json(state.runtime.status(&caller.user, &id).await?))
}

/// GET /v1/requests/{id}/events?after=N
pub async fn get_events(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<ExecutionEvent>>, ApiError> {
    let after = query.after.unwrap_or(0);
    Ok(Json(state.runtime.events(&caller.user, &id, after).await?))
}

/// GET /v1/messages/{id}
pub async fn get_message(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<Json<Message>, ApiError> {
    Ok(Json(state.runtime.message(&caller.user, &id).await?))
}

/// POST /v1/tool-calls/{id}/approve
pub async fn approve_tool_call(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<Json<ToolCall>, ApiError> {
    Ok(Json(state.runtime.approve(&caller.user, &id).await?))
}

/// POST /v1/tool-calls/{id}/reject
///
/// The body is optional; `{"reason": "..."}` is passed back to the model.
pub async fn reject_tool_call(
    State(state): State<GatewayState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<ToolCall>, ApiError> {
    let body: RejectBody = if body.iter().all(u8::is_ascii_whitespace) {
        RejectBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid reject body: {e}")))?
    };
    Ok(Json(
        state
            .runtime
            .reject(&caller.user, &id, body.reason.as_deref())
            .await?,
    ))
}

/// GET /health (unauthenticated)
pub async fn get_health(State(state): State<GatewayState>) -> (StatusCode, Json<HealthResponse>) {
    let storage = state.runtime.storage().health_check().await;
    let (status, label) = match storage {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "ok"),
        Ok(HealthStatus::Degraded(reason)) => {
            tracing::warn!(%reason, "storage degraded");
            (StatusCode::OK, "degraded")
        }
        Ok(HealthStatus::Unhealthy(reason)) => {
            tracing::warn!(%reason, "storage unhealthy");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
        Err(e) => {
            tracing::warn!(error = %e, "storage health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
        }
    };
    (
        status,
        Json(HealthResponse {
            status: label.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_secs: state.start_time.elapsed().as_secs(),
        }),
    )
}
