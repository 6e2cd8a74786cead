use serde::Deserialize;
use url::Url;

/// Retry, disable and sweep behaviour of the relay
///
/// Durations are strings understood by `duration-str` (e.g. `"30s"`, `"1h"`)
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Extra attempts after the first one
    #[serde(default = "default_retry_times")]
    pub retry_times: u32,
    /// Comma separated status codes that disable a channel on sight
    #[serde(default = "default_disable_status_codes")]
    pub retry_disable_status_codes: String,
    /// Treat content-empty upstream replies as retryable failures
    #[serde(default)]
    pub empty_response_retry: bool,
    /// Allow classified failures to auto-disable channels
    #[serde(default = "default_true")]
    pub automatic_disable: bool,
    /// Re-enable an auto-disabled channel when a pinned request to it succeeds
    #[serde(default)]
    pub automatic_enable: bool,
    /// Lower-case substrings of upstream messages that mean "disable me"
    #[serde(default = "default_disable_keywords")]
    pub disable_keywords: Vec<String>,
    /// Period of the quota/auto-reset sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: String,
    /// Aggregate usage counter writes instead of writing per request
    #[serde(default)]
    pub batch_update: bool,
    /// Flush period for aggregated usage writes
    #[serde(default = "default_batch_interval")]
    pub batch_interval: String,
    /// Record terminal relay failures in the error log
    #[serde(default = "default_true")]
    pub error_log: bool,
    /// Endpoint receiving channel enable/disable notifications
    #[serde(default)]
    pub notify_webhook: Option<Url>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            retry_times: default_retry_times(),
            retry_disable_status_codes: default_disable_status_codes(),
            empty_response_retry: false,
            automatic_disable: true,
            automatic_enable: false,
            disable_keywords: default_disable_keywords(),
            sweep_interval: default_sweep_interval(),
            batch_update: false,
            batch_interval: default_batch_interval(),
            error_log: true,
            notify_webhook: None,
        }
    }
}

const fn default_retry_times() -> u32 {
    3
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}

fn default_disable_status_codes() -> String {
    "401,403,429,500,502,503".to_owned()
}

fn default_sweep_interval() -> String {
    "60s".to_owned()
}

fn default_batch_interval() -> String {
    "5s".to_owned()
}

fn default_disable_keywords() -> Vec<String> {
    [
        "your credit balance is too low",
        "this organization has been disabled.",
        "you exceeded your current quota",
        "permission denied",
        "the security token included in the request is invalid",
        "operation not allowed",
        "your account is not authorized",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}
