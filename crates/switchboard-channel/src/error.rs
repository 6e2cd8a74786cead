use http::StatusCode;
use switchboard_core::HttpError;
use thiserror::Error;

use crate::{ChannelId, ChannelStatus, Trigger};

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(String),

    #[error("corrupt record for channel {id}: {reason}")]
    Corrupt { id: ChannelId, reason: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        Self::Redis(e.to_string())
    }
}

/// Channel registry and health errors
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {0} not found")]
    NotFound(ChannelId),

    #[error("no available channel for model {model} in group {group}")]
    NoneAvailable { group: String, model: String },

    #[error("channel {id} cannot move from {from} to {to} on {trigger}")]
    IllegalTransition {
        id: ChannelId,
        from: ChannelStatus,
        to: ChannelStatus,
        trigger: Trigger,
    },

    #[error("channel {id} status was changed elsewhere, expected {expected}")]
    Conflict { id: ChannelId, expected: ChannelStatus },

    #[error("invalid channel definition: {0}")]
    Definition(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl HttpError for ChannelError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::NoneAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::IllegalTransition { .. } | Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Definition(_) | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::NotFound(_) => "not_found_error",
            Self::NoneAvailable { .. } => "model_not_found",
            Self::IllegalTransition { .. } | Self::Conflict { .. } => "conflict_error",
            Self::Definition(_) | Self::Store(_) => "internal_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Definition(_) | Self::Store(_) => "internal channel store error".to_owned(),
            other => other.to_string(),
        }
    }
}
