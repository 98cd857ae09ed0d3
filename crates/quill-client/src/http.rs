// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP transport to a Quill gateway.
//!
//! JSON endpoints are called with reqwest; the event stream is parsed with
//! `eventsource-stream`. Error bodies are mapped back onto [`QuillError`]
//! through their `code`, so callers can tell a missing request from a
//! conflicting decision or a dead connection.

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use quill_core::QuillError;
use quill_core::api::{
    ErrorResponse, IDEMPOTENCY_KEY_HEADER, RejectBody, STREAM_ERROR_EVENT, SubmitBody,
    SubmitResponse,
};
use quill_core::types::{EventStream, ExecutionEvent, Message, StatusView, Submission, ToolCall};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::api::ExecutionApi;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway client authenticated with a bearer token.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpApi {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self, QuillError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| QuillError::Config(format!("invalid client token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        // No overall timeout: event streams stay open for the life of a request.
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| transport("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        entity: &str,
        id: &str,
    ) -> Result<reqwest::Response, QuillError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport("request to gateway failed", e))?;
        let status = response.status();
        debug!(status = %status, entity, id, "gateway response received");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => from_error_response(err, entity, id),
            Err(_) => QuillError::Transport {
                message: format!("gateway returned {status}: {body}"),
                source: None,
            },
        })
    }

    async fn json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        entity: &str,
        id: &str,
    ) -> Result<T, QuillError> {
        self.send(request, entity, id)
            .await?
            .json::<T>()
            .await
            .map_err(|e| transport("failed to decode gateway response", e))
    }
}

fn transport(context: &str, e: reqwest::Error) -> QuillError {
    QuillError::Transport {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

/// Rebuild a domain error from a gateway error body.
fn from_error_response(err: ErrorResponse, entity: &str, id: &str) -> QuillError {
    match err.code.as_str() {
        "validation" => QuillError::Validation(err.error),
        "not_found" => QuillError::not_found(entity, id),
        "illegal_transition" => QuillError::IllegalTransition {
            entity: entity.to_string(),
            from: id.to_string(),
            to: err.error,
        },
        "already_decided" => QuillError::AlreadyDecided {
            tool_call_id: id.to_string(),
            status: err.error,
        },
        "unauthorized" => QuillError::Config(format!("gateway rejected the client token: {}", err.error)),
        _ => QuillError::Transport {
            message: format!("gateway error ({}): {}", err.code, err.error),
            source: None,
        },
    }
}

/// Parse one SSE frame from the gateway.
///
/// Returns `None` for frames that carry no execution event.
fn parse_frame(event: &str, data: &str) -> Option<Result<ExecutionEvent, QuillError>> {
    if event == STREAM_ERROR_EVENT {
        let message = serde_json::from_str::<ErrorResponse>(data)
            .map(|e| e.error)
            .unwrap_or_else(|_| data.to_string());
        return Some(Err(QuillError::Transport {
            message: format!("event stream failed: {message}"),
            source: None,
        }));
    }
    if data.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str::<ExecutionEvent>(data).map_err(|e| QuillError::Transport {
            message: format!("failed to parse {event} event: {e}"),
            source: Some(Box::new(e)),
        }),
    )
}

#[async_trait]
impl ExecutionApi for HttpApi {
    async fn submit(
        &self,
        idempotency_key: &str,
        thread_id: &str,
        content: &str,
    ) -> Result<Submission, QuillError> {
        let request = self
            .client
            .post(self.url("/v1/requests"))
            .header(IDEMPOTENCY_KEY_HEADER, idempotency_key)
            .json(&SubmitBody {
                thread_id: thread_id.to_string(),
                content: content.to_string(),
            });
        let response: SubmitResponse = self.json(request, "thread", thread_id).await?;
        Ok(Submission {
            request_id: response.request_id,
            provisional_message_id: response.provisional_message_id,
            triggering_message_id: response.triggering_message_id,
            created: response.created,
        })
    }

    async fn status(&self, request_id: &str) -> Result<StatusView, QuillError> {
        let request = self.client.get(self.url(&format!("/v1/requests/{request_id}")));
        self.json(request, "request", request_id).await
    }

    async fn events(
        &self,
        request_id: &str,
        after_seq: i64,
    ) -> Result<Vec<ExecutionEvent>, QuillError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/requests/{request_id}/events?after={after_seq}")));
        self.json(request, "request", request_id).await
    }

    async fn stream(&self, request_id: &str, after_seq: i64) -> Result<EventStream, QuillError> {
        let request = self
            .client
            .get(self.url(&format!("/v1/requests/{request_id}/stream?after={after_seq}")))
            .header("accept", "text/event-stream");
        let response = self.send(request, "request", request_id).await?;

        let events = response
            .bytes_stream()
            .eventsource()
            .filter_map(|frame| async move {
                match frame {
                    Ok(frame) => parse_frame(&frame.event, &frame.data),
                    Err(e) => Some(Err(QuillError::Transport {
                        message: format!("event stream interrupted: {e}"),
                        source: None,
                    })),
                }
            });
        Ok(Box::pin(events))
    }

    async fn message(&self, message_id: &str) -> Result<Message, QuillError> {
        let request = self.client.get(self.url(&format!("/v1/messages/{message_id}")));
        self.json(request, "message", message_id).await
    }

    async fn approve(&self, tool_call_id: &str) -> Result<ToolCall, QuillError> {
        let request = self
            .client
            .post(self.url(&format!("/v1/tool-calls/{tool_call_id}/approve")));
        self.json(request, "tool call", tool_call_id).await
    }

    async fn reject(&self, tool_call_id: &str, reason: Option<&str>) -> Result<ToolCall, QuillError> {
        let request = self
            .client
            .post(self.url(&format!("/v1/tool-calls/{tool_call_id}/reject")))
            .json(&RejectBody {
                reason: reason.map(str::to_string),
            });
        self.json(request, "tool call", tool_call_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{EventKind, EventPayload};
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn event_json(seq: i64, payload: serde_json::Value) -> serde_json::Value {
        json!({
            "request_id": "r1",
            "seq": seq,
            "created_at": "2026-01-01T00:00:00.000Z",
            "payload": payload,
        })
    }

    #[tokio::test]
    async fn submit_sends_key_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/requests"))
            .and(header("authorization", "Bearer tok-alice"))
            .and(header("idempotency-key", "k1"))
            .and(body_json(json!({"thread_id": "t1", "content": "hi"})))
            .respond_with(ResponseTemplate::new(202).set_body_json(json!({
                "request_id": "r1",
                "provisional_message_id": "m2",
                "triggering_message_id": "m1",
                "created": true,
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), Some("tok-alice")).unwrap();
        let sub = api.submit("k1", "t1", "hi").await.unwrap();
        assert_eq!(sub.request_id, "r1");
        assert_eq!(sub.provisional_message_id, "m2");
        assert!(sub.created);
    }

    #[tokio::test]
    async fn error_codes_map_back_to_domain_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/requests/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": "request not found: missing",
                "code": "not_found",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/tool-calls/tc1/approve"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": "tool call tc1 already decided (rejected)",
                "code": "already_decided",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/tool-calls/tc2/reject"))
            .respond_with(ResponseTemplate::new(409).set_body_json(json!({
                "error": "illegal transition for request: failed -> rejected",
                "code": "illegal_transition",
            })))
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), Some("tok")).unwrap();
        let err = api.status("missing").await.unwrap_err();
        assert!(matches!(err, QuillError::NotFound { ref id, .. } if id == "missing"));

        let err = api.approve("tc1").await.unwrap_err();
        assert!(matches!(err, QuillError::AlreadyDecided { .. }), "got {err:?}");

        let err = api.reject("tc2", Some("no")).await.unwrap_err();
        assert!(matches!(err, QuillError::IllegalTransition { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn non_json_failures_are_transport_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), None).unwrap();
        let err = api.status("r1").await.unwrap_err();
        assert!(err.is_transient(), "got {err:?}");
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        let api = HttpApi::new("http://127.0.0.1:9", None).unwrap();
        let err = api.status("r1").await.unwrap_err();
        assert!(matches!(err, QuillError::Transport { .. }));
    }

    #[tokio::test]
    async fn stream_parses_events_and_cursor() {
        let server = MockServer::start().await;
        let mut body = String::new();
        for event in [
            event_json(4, json!({"type": "text_chunk", "text": "!"})),
            event_json(
                5,
                json!({"type": "completion", "message_id": "m2",
                       "usage": {"input_tokens": 1, "output_tokens": 2}}),
            ),
        ] {
            let kind = event["payload"]["type"].as_str().unwrap().to_string();
            body.push_str(&format!(
                ": keep-alive\n\nid: {}\nevent: {kind}\ndata: {event}\n\n",
                event["seq"]
            ));
        }
        Mock::given(method("GET"))
            .and(path("/v1/requests/r1/stream"))
            .and(query_param("after", "3"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), None).unwrap();
        let events: Vec<ExecutionEvent> = api
            .stream("r1", 3)
            .await
            .unwrap()
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].seq, 4);
        assert_eq!(
            events[0].payload,
            EventPayload::TextChunk { text: "!".into() }
        );
        assert_eq!(events[1].payload.kind(), EventKind::Completion);
    }

    #[tokio::test]
    async fn stream_error_frame_surfaces_as_error() {
        let server = MockServer::start().await;
        let body = format!(
            "event: {STREAM_ERROR_EVENT}\ndata: {}\n\n",
            json!({"error": "storage error: disk full", "code": "storage"})
        );
        Mock::given(method("GET"))
            .and(path("/v1/requests/r1/stream"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), None).unwrap();
        let items: Vec<_> = api.stream("r1", 0).await.unwrap().collect().await;
        assert_eq!(items.len(), 1);
        let err = items.into_iter().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("disk full"), "got {err}");
    }

    #[tokio::test]
    async fn reject_sends_reason() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/tool-calls/tc1/reject"))
            .and(body_json(json!({"reason": "not now"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "tc1",
                "request_id": "r1",
                "message_id": "m2",
                "name": "write_file",
                "input": {},
                "status": "rejected",
                "reason": "not now",
                "output": null,
                "revision": 1,
                "created_at": "2026-01-01T00:00:00.000Z",
                "decided_at": "2026-01-01T00:00:01.000Z",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let api = HttpApi::new(&server.uri(), None).unwrap();
        let call = api.reject("tc1", Some("not now")).await.unwrap();
        assert_eq!(call.reason.as_deref(), Some("not now"));
    }
}
