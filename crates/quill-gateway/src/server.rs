// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use quill_agent::Runtime;
use quill_config::model::GatewayConfig;
use quill_core::QuillError;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{AuthConfig, auth_middleware};
use crate::{handlers, sse};

const MAX_BODY_BYTES: usize = 256 * 1024;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub runtime: Arc<Runtime>,
    pub auth: AuthConfig,
    /// Interval between SSE keep-alive comments.
    pub keep_alive: Duration,
    pub start_time: Instant,
    /// Cancelled on shutdown; open SSE streams end with it.
    pub shutdown: CancellationToken,
}

impl GatewayState {
    pub fn new(runtime: Arc<Runtime>, config: &GatewayConfig) -> Self {
        Self {
            runtime,
            auth: AuthConfig::new(config.tokens.clone()),
            keep_alive: Duration::from_secs(config.keep_alive_secs.max(1)),
            start_time: Instant::now(),
            shutdown: CancellationToken::new(),
        }
    }
}

/// Build the gateway router.
///
/// - `GET /health` (public)
/// - `POST /v1/requests`
/// - `GET /v1/requests/{id}`
/// - `GET /v1/requests/{id}/events`
/// - `GET /v1/requests/{id}/stream` (SSE)
/// - `GET /v1/messages/{id}`
/// - `POST /v1/tool-calls/{id}/approve`
/// - `POST /v1/tool-calls/{id}/reject`
pub fn router(state: GatewayState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/requests", post(handlers::post_request))
        .route("/v1/requests/{id}", get(handlers::get_request))
        .route("/v1/requests/{id}/events", get(handlers::get_events))
        .route("/v1/requests/{id}/stream", get(sse::stream_events))
        .route("/v1/messages/{id}", get(handlers::get_message))
        .route("/v1/tool-calls/{id}/approve", post(handlers::approve_tool_call))
        .route("/v1/tool-calls/{id}/reject", post(handlers::reject_tool_call))
        .route_layer(axum_middleware::from_fn_with_state(
            state.auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind the configured listen address.
pub async fn bind(config: &GatewayConfig) -> Result<TcpListener, QuillError> {
    let addr = format!("{}:{}", config.host, config.port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| QuillError::Transport {
            message: format!("failed to bind gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Serve until `shutdown` is cancelled, then stop accepting connections.
pub async fn serve(
    listener: TcpListener,
    mut state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), QuillError> {
    state.shutdown = shutdown.clone();
    if state.auth.is_empty() {
        tracing::warn!("no gateway tokens configured, every /v1 request will be rejected");
    }
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "gateway listening");
    }

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| QuillError::Transport {
            message: format!("gateway server error: {e}"),
            source: Some(Box::new(e)),
        })
}
