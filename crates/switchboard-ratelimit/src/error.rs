use http::StatusCode;
use switchboard_core::HttpError;
use thiserror::Error;

/// Admission errors
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The channel used up its requests for the current minute
    #[error("channel rpm limit reached: limit {limit}, used {used}")]
    Exceeded {
        limit: i64,
        used: i64,
        /// Seconds until the minute bucket rolls over
        retry_after: u64,
    },
}

impl HttpError for RateLimitError {
    fn status_code(&self) -> StatusCode {
        StatusCode::TOO_MANY_REQUESTS
    }

    fn error_type(&self) -> &str {
        "rate_limit_exceeded"
    }

    fn client_message(&self) -> String {
        match self {
            Self::Exceeded { retry_after, .. } => {
                format!("channel is at its request rate limit, retry after {retry_after}s")
            }
        }
    }
}
