//! The per-protocol half of a relay
//!
//! The retry loop is shared; a [`RelayProtocol`] supplies the dispatch call,
//! the mapping of its native failure shape, and the rendering of a terminal
//! error in its own dialect.

mod claude;
mod completion;
mod realtime;
mod task;

use async_trait::async_trait;
use serde::Serialize;
use switchboard_channel::ChannelSlot;

pub use self::claude::{ClaudeAdapter, ClaudeErrorBody, ClaudeFailure, ClaudeProtocol, ClaudeReply};
pub use self::completion::{
    CompletionAdapter, CompletionProtocol, CompletionReply, OpenAiError, OpenAiFailure, is_empty_completion,
};
pub use self::realtime::{RealtimeAdapter, RealtimeFailure, RealtimeProtocol};
pub use self::task::{TaskAdapter, TaskFailure, TaskProtocol, TaskReply, TaskRequest};
use crate::error::{TerminalError, UpstreamError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProtocolKind {
    /// Request/response chat completion
    Completion,
    /// Bidirectional socket session
    Realtime,
    /// Anthropic messages dialect
    Claude,
    /// Asynchronous task submission
    Task,
}

#[async_trait]
pub trait RelayProtocol: Send + Sync {
    /// Inbound request handed to every attempt
    type Request: Send + Sync;
    type Success: Send;
    /// Native failure shape of the adapter
    type Failure: Send;

    fn kind(&self) -> ProtocolKind;

    /// Send the request to one channel, exactly once
    async fn dispatch(&self, request: &Self::Request, channel: &ChannelSlot) -> Result<Self::Success, Self::Failure>;

    /// Map a native failure onto the canonical shape
    fn normalize(&self, failure: Self::Failure) -> UpstreamError;

    /// Whether content-empty successes of this protocol can be retried
    fn detects_empty_response(&self) -> bool {
        false
    }

    fn is_empty_response(&self, _success: &Self::Success) -> bool {
        false
    }

    /// Quota consumed by a successful dispatch
    fn quota_of(&self, success: &Self::Success) -> i64;

    /// `error_type` written to the error log
    fn log_error_type(&self, error: &TerminalError) -> String {
        error.error_type.clone()
    }

    /// `error_code` written to the error log
    fn log_error_code(&self, error: &TerminalError) -> Option<String> {
        error.code.clone()
    }

    /// Body sent back to the caller for a terminal failure
    fn render_error(&self, error: &TerminalError) -> serde_json::Value;
}
