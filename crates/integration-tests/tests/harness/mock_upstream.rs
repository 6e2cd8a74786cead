//! Mock upstream backend for integration tests
//!
//! Serves OpenAI-style completions, Anthropic-style messages and task
//! submissions. Scripted replies are consumed first, in order, before the
//! mock falls back to a canned success.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

/// One scripted upstream reply
#[derive(Debug, Clone)]
pub struct Scripted {
    pub status: u16,
    pub body: Value,
}

impl Scripted {
    /// OpenAI-style error envelope
    pub fn openai_error(status: u16, error_type: &str, message: &str) -> Self {
        Self {
            status,
            body: json!({"error": {"message": message, "type": error_type, "code": null}}),
        }
    }

    /// Anthropic-style error envelope
    pub fn claude_error(status: u16, error_type: &str, message: &str) -> Self {
        Self {
            status,
            body: json!({"type": "error", "error": {"type": error_type, "message": message}}),
        }
    }

    /// A completion whose only choice has blank content
    pub fn empty_completion() -> Self {
        Self {
            status: 200,
            body: json!({
                "id": "chatcmpl-empty",
                "object": "chat.completion",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "  "}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 3, "completion_tokens": 0, "total_tokens": 3}
            }),
        }
    }
}

/// Mock upstream that records every request it receives
pub struct MockUpstream {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockState>,
}

struct MockState {
    request_count: AtomicU32,
    script: Mutex<VecDeque<Scripted>>,
    /// Content of the canned completion and message replies
    content: String,
}

impl MockUpstream {
    /// Start a mock that always succeeds
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(Vec::new(), "Hello from mock upstream").await
    }

    /// Start a mock that always succeeds with the given content
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_inner(Vec::new(), content).await
    }

    /// Start a mock that plays `script` before succeeding
    pub async fn start_scripted(script: Vec<Scripted>) -> anyhow::Result<Self> {
        Self::start_inner(script, "Hello from mock upstream").await
    }

    /// Start a mock that fails every request the same way
    pub async fn start_failing(reply: Scripted) -> anyhow::Result<Self> {
        Self::start_scripted(vec![reply; 64]).await
    }

    async fn start_inner(script: Vec<Scripted>, content: &str) -> anyhow::Result<Self> {
        let state = Arc::new(MockState {
            request_count: AtomicU32::new(0),
            script: Mutex::new(script.into()),
            content: content.to_owned(),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1/messages", routing::post(handle_messages))
            .route("/v1/tasks/{action}", routing::post(handle_task))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as a channel
    ///
    /// Includes `/v1` since the gateway appends paths like `/chat/completions`
    pub fn base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Number of requests received on any route
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl MockState {
    /// Count the request and pop the next scripted reply, if any
    fn next(&self) -> Option<Response> {
        self.request_count.fetch_add(1, Ordering::Relaxed);

        let scripted = self.script.lock().unwrap_or_else(|e| e.into_inner()).pop_front()?;
        let status = StatusCode::from_u16(scripted.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        Some((status, Json(scripted.body)).into_response())
    }
}

async fn handle_chat_completions(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if let Some(reply) = state.next() {
        return reply;
    }

    Json(json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": state.content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 12}
    }))
    .into_response()
}

async fn handle_messages(State(state): State<Arc<MockState>>, Json(body): Json<Value>) -> Response {
    if let Some(reply) = state.next() {
        return reply;
    }

    Json(json!({
        "id": "msg_mock",
        "type": "message",
        "role": "assistant",
        "model": body["model"],
        "content": [{"type": "text", "text": state.content}],
        "stop_reason": "end_turn",
        "usage": {"input_tokens": 4, "output_tokens": 6}
    }))
    .into_response()
}

async fn handle_task(State(state): State<Arc<MockState>>, Path(action): Path<String>) -> Response {
    if let Some(reply) = state.next() {
        return reply;
    }

    Json(json!({"task_id": format!("{action}-1"), "quota": 50})).into_response()
}
