//! Relay endpoints, one per protocol variant

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json, Router, routing};
use http::{HeaderValue, StatusCode};
use serde_json::Value;
use switchboard_relay::protocol::{ClaudeProtocol, CompletionProtocol, TaskProtocol, TaskRequest};
use switchboard_relay::{ChannelBinding, Relay, RelayProtocol, RelayRequest, TerminalError};

use crate::error::ServerError;
use crate::identity::{CallerContext, REQUEST_ID_HEADER};
use crate::upstream::HttpUpstream;

#[derive(Clone)]
pub struct RelayState {
    pub completion: Arc<Relay<CompletionProtocol<HttpUpstream>>>,
    pub claude: Arc<Relay<ClaudeProtocol<HttpUpstream>>>,
    pub task: Arc<Relay<TaskProtocol<HttpUpstream>>>,
}

pub fn relay_router(state: RelayState) -> Router {
    Router::new()
        .route("/v1/chat/completions", routing::post(chat_completions))
        .route("/v1/messages", routing::post(messages))
        .route("/v1/tasks/{action}", routing::post(submit_task))
        .with_state(state)
}

/// Handle `POST /v1/chat/completions`
async fn chat_completions(
    State(state): State<RelayState>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<Value>,
) -> Response {
    let request = match relay_request(&caller, &body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    // Dropping the handler (caller gone) cancels the loop at its next attempt
    let _guard = request.cancel.clone().drop_guard();

    match state.completion.run(&request, &body).await {
        Ok(relayed) => respond(relayed.payload.status, relayed.payload.body, &request),
        Err(error) => fail(state.completion.protocol(), &error),
    }
}

/// Handle `POST /v1/messages`
async fn messages(
    State(state): State<RelayState>,
    Extension(caller): Extension<CallerContext>,
    Json(body): Json<Value>,
) -> Response {
    let request = match relay_request(&caller, &body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    let _guard = request.cancel.clone().drop_guard();

    match state.claude.run(&request, &body).await {
        Ok(relayed) => respond(relayed.payload.status, relayed.payload.body, &request),
        Err(error) => fail(state.claude.protocol(), &error),
    }
}

/// Handle `POST /v1/tasks/{action}`
async fn submit_task(
    State(state): State<RelayState>,
    Extension(caller): Extension<CallerContext>,
    Path(action): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let request = match relay_request(&caller, &body) {
        Ok(request) => request,
        Err(e) => return e.into_response(),
    };
    let _guard = request.cancel.clone().drop_guard();
    let task = TaskRequest { action, body };

    match state.task.run(&request, &task).await {
        Ok(relayed) => respond(200, relayed.payload.body, &request),
        Err(error) => fail(state.task.protocol(), &error),
    }
}

fn relay_request(caller: &CallerContext, body: &Value) -> Result<RelayRequest, ServerError> {
    let model = body["model"]
        .as_str()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ServerError::BadRequest("request body must name a model".to_owned()))?;

    let binding = caller.pinned.map_or(ChannelBinding::Select, ChannelBinding::Pinned);

    Ok(RelayRequest::new(caller.identity.clone(), caller.group.clone(), model).with_binding(binding))
}

fn respond(status: u16, body: Value, request: &RelayRequest) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
    let mut response = (status, Json(body)).into_response();

    if let Ok(value) = HeaderValue::from_str(&request.identity.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}

fn fail<P: RelayProtocol>(protocol: &P, error: &TerminalError) -> Response {
    let mut response = (error.status, Json(protocol.render_error(error))).into_response();

    if let Ok(value) = HeaderValue::from_str(&error.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
