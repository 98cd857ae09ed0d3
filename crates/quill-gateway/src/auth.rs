// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer token authentication for the gateway.
//!
//! Tokens come from `[gateway.tokens]` and map to user identities. With no
//! tokens configured every request is rejected (fail-closed).

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::error::ApiError;

/// The authenticated user, inserted as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user: String,
}

/// Token to user mapping.
#[derive(Clone, Default)]
pub struct AuthConfig {
    tokens: Arc<BTreeMap<String, String>>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("tokens", &format_args!("[{} redacted]", self.tokens.len()))
            .finish()
    }
}

impl AuthConfig {
    pub fn new(tokens: BTreeMap<String, String>) -> Self {
        Self {
            tokens: Arc::new(tokens),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// The user a bearer token belongs to.
    pub fn identify(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }
}

/// Middleware that resolves `Authorization: Bearer <token>` to a [`CallerIdentity`].
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if auth.is_empty() {
        tracing::error!("gateway has no tokens configured -- rejecting request");
        return Err(ApiError::unauthorized());
    }

    let user = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| auth.identify(token.trim()))
        .map(str::to_string);

    match user {
        Some(user) => {
            request.extensions_mut().insert(CallerIdentity { user });
            Ok(next.run(request).await)
        }
        None => {
            tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
            Err(ApiError::unauthorized())
        }
    }
}
