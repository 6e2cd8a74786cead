use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use switchboard_channel::ChannelSlot;

use super::{ProtocolKind, RelayProtocol};
use crate::error::{TerminalError, UpstreamError};

#[derive(Debug, Clone, PartialEq)]
pub struct ClaudeReply {
    pub status: u16,
    pub body: Value,
}

/// `error` member of an Anthropic error response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaudeErrorBody {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeFailure {
    pub status: u16,
    pub error: ClaudeErrorBody,
    pub local: bool,
}

#[async_trait]
pub trait ClaudeAdapter: Send + Sync {
    async fn messages(&self, body: &Value, channel: &ChannelSlot) -> Result<ClaudeReply, ClaudeFailure>;
}

/// Anthropic messages dialect
#[derive(Debug, Clone)]
pub struct ClaudeProtocol<A> {
    adapter: A,
}

impl<A: ClaudeAdapter> ClaudeProtocol<A> {
    pub const fn new(adapter: A) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: ClaudeAdapter> RelayProtocol for ClaudeProtocol<A> {
    type Request = Value;
    type Success = ClaudeReply;
    type Failure = ClaudeFailure;

    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Claude
    }

    async fn dispatch(&self, request: &Value, channel: &ChannelSlot) -> Result<ClaudeReply, ClaudeFailure> {
        self.adapter.messages(request, channel).await
    }

    fn normalize(&self, failure: ClaudeFailure) -> UpstreamError {
        UpstreamError {
            status: failure.status,
            error_type: Some(failure.error.error_type).filter(|t| !t.is_empty()),
            code: None,
            message: failure.error.message,
            local: failure.local,
        }
    }

    fn quota_of(&self, success: &ClaudeReply) -> i64 {
        let usage = &success.body["usage"];
        usage["input_tokens"].as_i64().unwrap_or(0) + usage["output_tokens"].as_i64().unwrap_or(0)
    }

    fn log_error_code(&self, _error: &TerminalError) -> Option<String> {
        Some("claude_error".to_owned())
    }

    fn render_error(&self, error: &TerminalError) -> Value {
        json!({
            "type": "error",
            "error": {
                "type": error.error_type,
                "message": error.message,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoAdapter;

    #[async_trait]
    impl ClaudeAdapter for NoAdapter {
        async fn messages(&self, _: &Value, _: &ChannelSlot) -> Result<ClaudeReply, ClaudeFailure> {
            unreachable!()
        }
    }

    #[test]
    fn overloaded_error_keeps_its_type() {
        let protocol = ClaudeProtocol::new(NoAdapter);
        let error = protocol.normalize(ClaudeFailure {
            status: 529,
            error: ClaudeErrorBody {
                error_type: "overloaded_error".to_owned(),
                message: "Overloaded".to_owned(),
            },
            local: false,
        });

        assert_eq!(error.status, 529);
        assert_eq!(error.error_type.as_deref(), Some("overloaded_error"));
        assert!(!protocol.detects_empty_response());
    }

    #[test]
    fn quota_adds_input_and_output_tokens() {
        let protocol = ClaudeProtocol::new(NoAdapter);
        let reply = ClaudeReply {
            status: 200,
            body: json!({ "usage": { "input_tokens": 10, "output_tokens": 5 } }),
        };

        assert_eq!(protocol.quota_of(&reply), 15);
    }
}
