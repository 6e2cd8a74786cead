use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde::Serialize;
use switchboard_channel::ChannelError;
use switchboard_core::HttpError;
use thiserror::Error;

/// Failures of the HTTP surface itself
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("missing or invalid admin token")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),
}

impl HttpError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Channel(e) => e.status_code(),
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    fn error_type(&self) -> &str {
        match self {
            Self::Channel(e) => e.error_type(),
            Self::Unauthorized => "authentication_error",
            Self::BadRequest(_) => "invalid_request_error",
        }
    }

    fn client_message(&self) -> String {
        match self {
            Self::Channel(e) => e.client_message(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorDetails {
                message: self.client_message(),
                r#type: self.error_type().to_owned(),
            },
        };

        (status, Json(body)).into_response()
    }
}
