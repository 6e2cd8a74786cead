use serde::Serialize;

/// Who is calling and how to correlate the call in logs
///
/// Built by the transport layer once per inbound request and threaded
/// through every relay attempt unchanged
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestIdentity {
    /// Correlation id echoed back in error messages
    pub request_id: String,
    /// Calling user, when the transport knows it
    pub user_id: Option<String>,
    /// Name of the API token used by the caller
    pub token_name: Option<String>,
    /// Id of the API token used by the caller
    pub token_id: Option<String>,
}

impl RequestIdentity {
    /// Identity with a freshly generated request id and nothing else
    pub fn anonymous() -> Self {
        Self::with_request_id(uuid::Uuid::new_v4().to_string())
    }

    /// Identity carrying a caller-supplied request id
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: None,
            token_name: None,
            token_id: None,
        }
    }

    /// Append the request id to a message shown to the caller
    pub fn tag_message(&self, message: &str) -> String {
        format!("{message} (request id: {})", self.request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_identity_has_request_id() {
        let identity = RequestIdentity::anonymous();
        assert!(!identity.request_id.is_empty());
        assert!(identity.user_id.is_none());
    }

    #[test]
    fn tag_message_appends_request_id() {
        let identity = RequestIdentity::with_request_id("req-1");
        assert_eq!(identity.tag_message("boom"), "boom (request id: req-1)");
    }
}
