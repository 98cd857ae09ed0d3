// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping of domain errors onto HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use quill_core::QuillError;
use quill_core::api::ErrorResponse;

/// An error rendered as a JSON [`ErrorResponse`].
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation",
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthorized",
            message: "missing or invalid bearer token".into(),
        }
    }
}

impl From<QuillError> for ApiError {
    fn from(err: QuillError) -> Self {
        let status = match &err {
            QuillError::Validation(_) => StatusCode::BAD_REQUEST,
            QuillError::NotFound { .. } => StatusCode::NOT_FOUND,
            QuillError::IllegalTransition { .. } | QuillError::AlreadyDecided { .. } => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, code = err.code(), "request handling failed");
        }
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
                code: self.code.to_string(),
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (QuillError::Validation("empty".into()), StatusCode::BAD_REQUEST),
            (QuillError::not_found("request", "r1"), StatusCode::NOT_FOUND),
            (
                QuillError::illegal_transition("request", "failed", "approved"),
                StatusCode::CONFLICT,
            ),
            (
                QuillError::AlreadyDecided {
                    tool_call_id: "tc1".into(),
                    status: "approved".into(),
                },
                StatusCode::CONFLICT,
            ),
            (QuillError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            let code = err.code();
            let api = ApiError::from(err);
            assert_eq!(api.status, expected);
            assert_eq!(api.code, code);
        }
    }
}
