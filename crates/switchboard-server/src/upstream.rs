//! Pass-through adapter: forwards JSON bodies to a channel's base URL

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::Value;
use switchboard_channel::ChannelSlot;
use switchboard_config::ChannelKind;
use switchboard_relay::protocol::{
    ClaudeAdapter, ClaudeErrorBody, ClaudeFailure, ClaudeReply, CompletionAdapter, CompletionReply, OpenAiError,
    OpenAiFailure, TaskAdapter, TaskFailure, TaskReply, TaskRequest,
};
use url::Url;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Status reported when the upstream could not be reached at all
const UNREACHABLE_STATUS: u16 = 500;

/// Forwards requests verbatim; no wire-format translation happens here
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: Client,
}

impl HttpUpstream {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn post(&self, channel: &ChannelSlot, fallback: &str, path: &str) -> Option<RequestBuilder> {
        let definition = channel.definition();
        let base = match &definition.base_url {
            Some(url) => url.as_str().trim_end_matches('/').to_owned(),
            None if !fallback.is_empty() => fallback.to_owned(),
            None => return None,
        };
        let url = Url::parse(&format!("{base}/{path}")).ok()?;

        let mut builder = self.client.post(url);
        if let Some(key) = &definition.api_key {
            builder = match definition.kind {
                ChannelKind::Anthropic => builder
                    .header("x-api-key", key.expose_secret())
                    .header("anthropic-version", ANTHROPIC_VERSION),
                _ => builder.bearer_auth(key.expose_secret()),
            };
        }

        Some(builder)
    }
}

fn default_base(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::Openai => OPENAI_BASE_URL,
        ChannelKind::Anthropic => ANTHROPIC_BASE_URL,
        ChannelKind::Gemini | ChannelKind::Task | ChannelKind::Other => "",
    }
}

/// Send and split into status and parsed body
async fn exchange(builder: RequestBuilder, channel: &ChannelSlot) -> Result<(u16, Value), reqwest::Error> {
    let response: Response = builder.send().await.inspect_err(|e| {
        tracing::warn!(channel_id = %channel.id(), error = %e, "upstream request failed");
    })?;

    let status = response.status().as_u16();
    let text = response.text().await?;
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));

    Ok((status, body))
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Best-effort message out of a non-conforming error body
fn raw_message(body: &Value) -> String {
    match body {
        Value::String(text) if !text.is_empty() => text.clone(),
        Value::Null => "upstream returned no body".to_owned(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct OpenAiEnvelope {
    error: OpenAiError,
}

#[async_trait]
impl CompletionAdapter for HttpUpstream {
    async fn complete(&self, body: &Value, channel: &ChannelSlot) -> Result<CompletionReply, OpenAiFailure> {
        let Some(builder) = self.post(channel, default_base(channel.definition().kind), "chat/completions") else {
            return Err(OpenAiFailure {
                local: true,
                ..OpenAiFailure::new(500, "channel_misconfigured", "channel has no usable base_url")
            });
        };

        let (status, reply) = exchange(builder.json(body), channel)
            .await
            .map_err(|e| OpenAiFailure::new(UNREACHABLE_STATUS, "do_request_failed", e.to_string()))?;

        if is_success(status) {
            return Ok(CompletionReply { status, body: reply });
        }

        let error = match serde_json::from_value::<OpenAiEnvelope>(reply.clone()) {
            Ok(envelope) => envelope.error,
            Err(_) => OpenAiError {
                message: raw_message(&reply),
                error_type: "upstream_error".to_owned(),
                code: Value::Null,
            },
        };

        Err(OpenAiFailure {
            status,
            error,
            local: false,
        })
    }
}

#[derive(Deserialize)]
struct ClaudeEnvelope {
    error: ClaudeErrorBody,
}

#[async_trait]
impl ClaudeAdapter for HttpUpstream {
    async fn messages(&self, body: &Value, channel: &ChannelSlot) -> Result<ClaudeReply, ClaudeFailure> {
        let failure = |status, error_type: &str, message: String, local| ClaudeFailure {
            status,
            error: ClaudeErrorBody {
                error_type: error_type.to_owned(),
                message,
            },
            local,
        };

        let Some(builder) = self.post(channel, ANTHROPIC_BASE_URL, "messages") else {
            return Err(failure(500, "channel_misconfigured", "channel has no usable base_url".to_owned(), true));
        };

        let (status, reply) = exchange(builder.json(body), channel)
            .await
            .map_err(|e| failure(UNREACHABLE_STATUS, "do_request_failed", e.to_string(), false))?;

        if is_success(status) {
            return Ok(ClaudeReply { status, body: reply });
        }

        match serde_json::from_value::<ClaudeEnvelope>(reply.clone()) {
            Ok(envelope) => Err(ClaudeFailure {
                status,
                error: envelope.error,
                local: false,
            }),
            Err(_) => Err(failure(status, "upstream_error", raw_message(&reply), false)),
        }
    }
}

#[async_trait]
impl TaskAdapter for HttpUpstream {
    async fn submit(&self, request: &TaskRequest, channel: &ChannelSlot) -> Result<TaskReply, TaskFailure> {
        let path = format!("tasks/{}", request.action);
        let Some(builder) = self.post(channel, "", &path) else {
            return Err(TaskFailure {
                status: 500,
                code: "channel_misconfigured".to_owned(),
                message: "task channel has no base_url".to_owned(),
                local: true,
            });
        };

        let (status, reply) = exchange(builder.json(&request.body), channel)
            .await
            .map_err(|e| TaskFailure {
                status: UNREACHABLE_STATUS,
                code: "do_request_failed".to_owned(),
                message: e.to_string(),
                local: false,
            })?;

        if !is_success(status) {
            return Err(TaskFailure {
                status,
                code: reply["code"].as_str().unwrap_or("upstream_error").to_owned(),
                message: reply["message"]
                    .as_str()
                    .map_or_else(|| raw_message(&reply), str::to_owned),
                local: false,
            });
        }

        let task_id = reply["task_id"]
            .as_str()
            .or_else(|| reply["id"].as_str())
            .unwrap_or_default()
            .to_owned();
        let quota = reply["quota"].as_i64().unwrap_or(0);

        Ok(TaskReply {
            task_id,
            body: reply,
            quota,
        })
    }
}
