use http::StatusCode;
use serde::Serialize;
use switchboard_channel::ChannelId;
use switchboard_core::HttpError;
use thiserror::Error;

use crate::RetryRecord;

/// Reason string attached to content-empty upstream replies
pub const EMPTY_RESPONSE: &str = "empty_response";

/// Message returned instead of a terminal upstream 429
pub const SATURATED_MESSAGE: &str = "upstream load for this group is saturated, please retry later";

/// Canonical shape of a failed dispatch
///
/// Every protocol variant normalises its native error into this before
/// classification.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("status {status}: {message}")]
pub struct UpstreamError {
    pub status: u16,
    pub error_type: Option<String>,
    pub code: Option<String>,
    pub message: String,
    /// Raised by the gateway itself, never attributable to the upstream
    pub local: bool,
}

impl UpstreamError {
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type: None,
            code: None,
            message: message.into(),
            local: false,
        }
    }

    pub fn local(status: u16, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            error_type: Some(error_type.into()),
            code: None,
            message: message.into(),
            local: true,
        }
    }

    /// A syntactically valid reply without any content
    pub fn empty_response() -> Self {
        Self {
            status: 200,
            error_type: Some(EMPTY_RESPONSE.to_owned()),
            code: None,
            message: "upstream returned an empty response".to_owned(),
            local: false,
        }
    }

    #[must_use]
    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_empty_response(&self) -> bool {
        self.error_type.as_deref() == Some(EMPTY_RESPONSE)
    }
}

/// Coarse failure taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    LocalError,
    EmptyResponse,
    RateLimited,
    AuthFailure,
    QuotaExhausted,
    ServerError,
    Timeout,
    Other,
}

/// One attempt's failure after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedError {
    pub status: u16,
    pub kind: ErrorKind,
    pub message: String,
    pub local: bool,
}

/// Failure surfaced to the caller once the relay gives up
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TerminalError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub error_type: String,
    pub code: Option<String>,
    /// Client-facing message, already tagged with the request id
    pub message: String,
    pub request_id: String,
    /// Channels dispatched to, in order
    pub trail: Vec<ChannelId>,
    pub retries: Vec<RetryRecord>,
}

impl HttpError for TerminalError {
    fn status_code(&self) -> StatusCode {
        self.status
    }

    fn error_type(&self) -> &str {
        &self.error_type
    }

    fn client_message(&self) -> String {
        self.message.clone()
    }
}
