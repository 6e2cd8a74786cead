use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use switchboard_channel::ChannelSlot;

use super::{ProtocolKind, RelayProtocol};
use crate::error::{TerminalError, UpstreamError};

/// Successful chat completion as returned by the upstream
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReply {
    pub status: u16,
    pub body: Value,
}

/// Error object of the OpenAI wire format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAiError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: String,
    /// String, number or null depending on the upstream
    #[serde(default)]
    pub code: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenAiFailure {
    pub status: u16,
    pub error: OpenAiError,
    pub local: bool,
}

impl OpenAiFailure {
    pub fn new(status: u16, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error: OpenAiError {
                message: message.into(),
                error_type: error_type.into(),
                code: Value::Null,
            },
            local: false,
        }
    }
}

#[async_trait]
pub trait CompletionAdapter: Send + Sync {
    async fn complete(&self, body: &Value, channel: &ChannelSlot) -> Result<CompletionReply, OpenAiFailure>;
}

/// OpenAI-shaped chat completions
#[derive(Debug, Clone)]
pub struct CompletionProtocol<A> {
    adapter: A,
}

impl<A: CompletionAdapter> CompletionProtocol<A> {
    pub const fn new(adapter: A) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: CompletionAdapter> RelayProtocol for CompletionProtocol<A> {
    type Request = Value;
    type Success = CompletionReply;
    type Failure = OpenAiFailure;

    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Completion
    }

    async fn dispatch(&self, request: &Value, channel: &ChannelSlot) -> Result<CompletionReply, OpenAiFailure> {
        self.adapter.complete(request, channel).await
    }

    fn normalize(&self, failure: OpenAiFailure) -> UpstreamError {
        let code = match failure.error.code {
            Value::String(code) if !code.is_empty() => Some(code),
            Value::Number(code) => Some(code.to_string()),
            _ => None,
        };

        UpstreamError {
            status: failure.status,
            error_type: Some(failure.error.error_type).filter(|t| !t.is_empty()),
            code,
            message: failure.error.message,
            local: failure.local,
        }
    }

    fn detects_empty_response(&self) -> bool {
        true
    }

    fn is_empty_response(&self, success: &CompletionReply) -> bool {
        is_empty_completion(&success.body)
    }

    fn quota_of(&self, success: &CompletionReply) -> i64 {
        success.body["usage"]["total_tokens"].as_i64().unwrap_or(0)
    }

    fn render_error(&self, error: &TerminalError) -> Value {
        json!({
            "error": {
                "message": error.message,
                "type": error.error_type,
                "code": error.code,
            }
        })
    }
}

/// A completion without choices, or whose first choice carries no text
/// and no tool call
pub fn is_empty_completion(body: &Value) -> bool {
    let Some(choice) = body["choices"].as_array().and_then(|choices| choices.first()) else {
        return true;
    };

    let message = &choice["message"];
    let has_tool_calls = message["tool_calls"].as_array().is_some_and(|calls| !calls.is_empty());
    if has_tool_calls {
        return false;
    }

    content_text(&message["content"]).trim().is_empty()
}

fn content_text(content: &Value) -> String {
    match content {
        Value::String(text) => text.clone(),
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| part["text"].as_str())
            .collect::<String>(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NoAdapter;

    #[async_trait]
    impl CompletionAdapter for NoAdapter {
        async fn complete(&self, _: &Value, _: &ChannelSlot) -> Result<CompletionReply, OpenAiFailure> {
            Err(OpenAiFailure::new(500, "server_error", "unused"))
        }
    }

    #[test]
    fn empty_completions_are_detected() {
        assert!(is_empty_completion(&json!({ "choices": [] })));
        assert!(is_empty_completion(&json!({ "id": "x" })));
        assert!(is_empty_completion(&json!({ "choices": [{ "message": { "content": "  \n" } }] })));
        assert!(!is_empty_completion(&json!({ "choices": [{ "message": { "content": "hi" } }] })));
        assert!(!is_empty_completion(&json!({
            "choices": [{ "message": { "content": null, "tool_calls": [{ "id": "call_1" }] } }]
        })));
        assert!(!is_empty_completion(&json!({
            "choices": [{ "message": { "content": [{ "type": "text", "text": "hi" }] } }]
        })));
    }

    #[test]
    fn numeric_codes_are_stringified() {
        let protocol = CompletionProtocol::new(NoAdapter);
        let failure = OpenAiFailure {
            status: 400,
            error: OpenAiError {
                message: "bad".to_owned(),
                error_type: "invalid_request_error".to_owned(),
                code: json!(1234),
            },
            local: false,
        };

        let error = protocol.normalize(failure);
        assert_eq!(error.code.as_deref(), Some("1234"));
        assert_eq!(error.error_type.as_deref(), Some("invalid_request_error"));
    }

    #[test]
    fn quota_is_total_tokens() {
        let protocol = CompletionProtocol::new(NoAdapter);
        let reply = CompletionReply {
            status: 200,
            body: json!({ "usage": { "total_tokens": 42 } }),
        };

        assert_eq!(protocol.quota_of(&reply), 42);
    }
}
