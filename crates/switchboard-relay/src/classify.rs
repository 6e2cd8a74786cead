//! Turning a failed dispatch into a retry and disable decision

use switchboard_config::{ChannelKind, RelaySettings};

use crate::KeywordMatcher;
use crate::error::{ClassifiedError, ErrorKind, UpstreamError};

/// Statuses that may hide a slow but successful upstream call
const TIMEOUT_STATUSES: [u16; 3] = [504, 524, 408];

const CREDENTIAL_CODES: [&str; 3] = ["invalid_api_key", "account_deactivated", "billing_not_active"];

const CREDENTIAL_TYPES: [&str; 5] = [
    "insufficient_quota",
    "insufficient_user_quota",
    "authentication_error",
    "permission_error",
    "forbidden",
];

/// Per-attempt inputs of the classifier
#[derive(Debug, Clone, Copy)]
pub struct ClassifyContext<'a> {
    pub settings: &'a RelaySettings,
    /// The request is bound to one channel and must not move
    pub pinned: bool,
    /// Attempts left after the current one
    pub remaining: u32,
    /// Empty replies of this protocol are reported as failures
    pub empty_response_aware: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub error: ClassifiedError,
    pub should_retry: bool,
    /// Status is in the immediate-disable set
    pub disable_immediately: bool,
}

pub fn classify(error: &UpstreamError, ctx: &ClassifyContext<'_>) -> Classification {
    let kind = kind_of(error);

    Classification {
        error: ClassifiedError {
            status: error.status,
            kind,
            message: error.message.clone(),
            local: error.local,
        },
        should_retry: should_retry(error, ctx),
        disable_immediately: kind != ErrorKind::LocalError
            && kind != ErrorKind::EmptyResponse
            && ctx.settings.immediate_disable_codes.contains(&error.status),
    }
}

pub fn kind_of(error: &UpstreamError) -> ErrorKind {
    if error.local {
        return ErrorKind::LocalError;
    }
    if error.is_empty_response() {
        return ErrorKind::EmptyResponse;
    }

    let error_type = error.error_type.as_deref().unwrap_or_default();

    match error.status {
        status if TIMEOUT_STATUSES.contains(&status) => ErrorKind::Timeout,
        429 => ErrorKind::RateLimited,
        _ if matches!(error_type, "insufficient_quota" | "insufficient_user_quota")
            || error.code.as_deref() == Some("billing_not_active") =>
        {
            ErrorKind::QuotaExhausted
        }
        401 | 403 => ErrorKind::AuthFailure,
        _ if matches!(error_type, "authentication_error" | "permission_error") => ErrorKind::AuthFailure,
        500..=599 => ErrorKind::ServerError,
        _ => ErrorKind::Other,
    }
}

pub fn should_retry(error: &UpstreamError, ctx: &ClassifyContext<'_>) -> bool {
    if error.local || ctx.remaining == 0 || ctx.pinned {
        return false;
    }
    if error.is_empty_response() {
        return ctx.empty_response_aware;
    }
    if (200..300).contains(&error.status) {
        return false;
    }

    !TIMEOUT_STATUSES.contains(&error.status)
}

/// Whether a failure outside the immediate path should take the channel out
///
/// The channel's own auto-ban flag is enforced by the health state machine.
pub fn should_disable_channel(
    kind: ChannelKind,
    error: &UpstreamError,
    settings: &RelaySettings,
    keywords: &KeywordMatcher,
) -> bool {
    if !settings.automatic_disable || error.local || error.is_empty_response() {
        return false;
    }

    if !settings.immediate_disable_codes.is_empty() {
        return settings.immediate_disable_codes.contains(&error.status);
    }

    if error.status == 401 || (error.status == 403 && kind == ChannelKind::Gemini) {
        return true;
    }

    if error
        .code
        .as_deref()
        .is_some_and(|code| CREDENTIAL_CODES.contains(&code))
    {
        return true;
    }

    if error
        .error_type
        .as_deref()
        .is_some_and(|error_type| CREDENTIAL_TYPES.contains(&error_type))
    {
        return true;
    }

    keywords.matches(&settings.disable_keywords, &error.message.to_lowercase())
}

/// Short tag describing why an attempt is retried
pub fn retry_reason(error: &UpstreamError) -> String {
    let reason = match error.status {
        429 => "rate_limit",
        500 => "server_error",
        502 => "bad_gateway",
        503 => "service_unavailable",
        504 => "gateway_timeout",
        401 => "unauthorized",
        403 => "forbidden",
        status => match error.error_type.as_deref() {
            Some(t @ ("empty_response" | "insufficient_quota")) => t,
            _ => return format!("http_{status}"),
        },
    };

    reason.to_owned()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn settings() -> RelaySettings {
        RelaySettings::default()
    }

    fn context(settings: &RelaySettings) -> ClassifyContext<'_> {
        ClassifyContext {
            settings,
            pinned: false,
            remaining: 2,
            empty_response_aware: true,
        }
    }

    #[test]
    fn local_errors_are_final() {
        let settings = settings();
        let error = UpstreamError::local(503, "model_not_found", "no channel");

        let result = classify(&error, &context(&settings));

        assert_eq!(result.error.kind, ErrorKind::LocalError);
        assert!(!result.should_retry);
        assert!(!result.disable_immediately);
    }

    #[test]
    fn immediate_set_is_flagged() {
        let settings = settings();

        let result = classify(&UpstreamError::upstream(401, "bad key"), &context(&settings));

        assert!(result.disable_immediately);
        assert_eq!(result.error.kind, ErrorKind::AuthFailure);
    }

    #[test]
    fn timeouts_are_never_retried() {
        let settings = settings();

        for status in [504, 524, 408] {
            let result = classify(&UpstreamError::upstream(status, "slow"), &context(&settings));
            assert!(!result.should_retry, "{status}");
            assert_eq!(result.error.kind, ErrorKind::Timeout);
        }
    }

    #[test]
    fn retries_stop_when_budget_is_spent_or_pinned() {
        let settings = settings();
        let error = UpstreamError::upstream(500, "boom");

        let spent = ClassifyContext {
            remaining: 0,
            ..context(&settings)
        };
        let pinned = ClassifyContext {
            pinned: true,
            ..context(&settings)
        };

        assert!(should_retry(&error, &context(&settings)));
        assert!(!should_retry(&error, &spent));
        assert!(!should_retry(&error, &pinned));
    }

    #[test]
    fn empty_response_retries_only_when_protocol_is_aware() {
        let settings = settings();
        let error = UpstreamError::empty_response();
        let unaware = ClassifyContext {
            empty_response_aware: false,
            ..context(&settings)
        };

        assert!(should_retry(&error, &context(&settings)));
        assert!(!should_retry(&error, &unaware));
        assert!(!classify(&error, &context(&settings)).disable_immediately);
    }

    #[test]
    fn success_statuses_do_not_retry() {
        let settings = settings();
        assert!(!should_retry(&UpstreamError::upstream(201, "odd"), &context(&settings)));
    }

    #[test]
    fn non_empty_code_set_is_authoritative() {
        let settings = settings();
        let keywords = KeywordMatcher::new();
        let quota = UpstreamError::upstream(400, "no money").with_type("insufficient_quota");

        assert!(should_disable_channel(ChannelKind::Openai, &UpstreamError::upstream(500, "x"), &settings, &keywords));
        assert!(!should_disable_channel(ChannelKind::Openai, &quota, &settings, &keywords));
    }

    #[test]
    fn heuristics_apply_with_empty_code_set() {
        let settings = RelaySettings {
            immediate_disable_codes: BTreeSet::new(),
            disable_keywords: vec!["organization has been disabled".to_owned()],
            ..settings()
        };
        let keywords = KeywordMatcher::new();
        let disables = |kind, error: UpstreamError| should_disable_channel(kind, &error, &settings, &keywords);

        assert!(disables(ChannelKind::Openai, UpstreamError::upstream(401, "bad key")));
        assert!(disables(ChannelKind::Gemini, UpstreamError::upstream(403, "denied")));
        assert!(!disables(ChannelKind::Openai, UpstreamError::upstream(403, "denied")));
        assert!(disables(ChannelKind::Openai, UpstreamError::upstream(400, "x").with_code("account_deactivated")));
        assert!(disables(ChannelKind::Anthropic, UpstreamError::upstream(400, "x").with_type("permission_error")));
        assert!(disables(ChannelKind::Openai, UpstreamError::upstream(400, "This Organization has been disabled.")));
        assert!(!disables(ChannelKind::Openai, UpstreamError::upstream(500, "boom")));
    }

    #[test]
    fn automatic_disable_off_never_disables() {
        let settings = RelaySettings {
            automatic_disable: false,
            ..settings()
        };

        assert!(!should_disable_channel(
            ChannelKind::Openai,
            &UpstreamError::upstream(401, "bad key"),
            &settings,
            &KeywordMatcher::new()
        ));
    }

    #[test]
    fn reasons_follow_status_then_type() {
        assert_eq!(retry_reason(&UpstreamError::upstream(429, "x")), "rate_limit");
        assert_eq!(retry_reason(&UpstreamError::upstream(502, "x")), "bad_gateway");
        assert_eq!(retry_reason(&UpstreamError::empty_response()), "empty_response");
        assert_eq!(
            retry_reason(&UpstreamError::upstream(400, "x").with_type("insufficient_quota")),
            "insufficient_quota"
        );
        assert_eq!(retry_reason(&UpstreamError::upstream(418, "x")), "http_418");
    }
}
