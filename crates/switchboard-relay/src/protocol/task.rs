use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_channel::ChannelSlot;

use super::{ProtocolKind, RelayProtocol};
use crate::error::{TerminalError, UpstreamError};

/// Submission of an asynchronous task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    /// Provider action, e.g. `generate` or `fetch`
    pub action: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskReply {
    pub task_id: String,
    pub body: Value,
    /// Quota the upstream charged for the submission
    pub quota: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub status: u16,
    pub code: String,
    pub message: String,
    pub local: bool,
}

#[async_trait]
pub trait TaskAdapter: Send + Sync {
    async fn submit(&self, request: &TaskRequest, channel: &ChannelSlot) -> Result<TaskReply, TaskFailure>;
}

/// Task submission; a task reply is never treated as empty
#[derive(Debug, Clone)]
pub struct TaskProtocol<A> {
    adapter: A,
}

impl<A: TaskAdapter> TaskProtocol<A> {
    pub const fn new(adapter: A) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: TaskAdapter> RelayProtocol for TaskProtocol<A> {
    type Request = TaskRequest;
    type Success = TaskReply;
    type Failure = TaskFailure;

    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Task
    }

    async fn dispatch(&self, request: &TaskRequest, channel: &ChannelSlot) -> Result<TaskReply, TaskFailure> {
        self.adapter.submit(request, channel).await
    }

    fn normalize(&self, failure: TaskFailure) -> UpstreamError {
        UpstreamError {
            status: failure.status,
            error_type: None,
            code: Some(failure.code).filter(|c| !c.is_empty()),
            message: failure.message,
            local: failure.local,
        }
    }

    fn quota_of(&self, success: &TaskReply) -> i64 {
        success.quota
    }

    fn log_error_type(&self, _error: &TerminalError) -> String {
        "task_error".to_owned()
    }

    fn render_error(&self, error: &TerminalError) -> Value {
        json!({
            "code": error.code.as_deref().unwrap_or(&error.error_type),
            "message": error.message,
            "data": null,
        })
    }
}
