use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use url::Url;

/// One upstream backend as declared by the operator
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    /// Stable unique id
    pub id: u32,
    /// Display name used in logs and notifications
    pub name: String,
    /// Upstream flavour, decides some disable heuristics
    #[serde(rename = "type", default)]
    pub kind: ChannelKind,
    /// Upstream base URL
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Upstream credential
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Tenant groups served by this channel
    #[serde(default = "default_groups")]
    pub groups: Vec<String>,
    /// Models served by this channel
    pub models: Vec<String>,
    /// Higher tiers are always preferred
    #[serde(default)]
    pub priority: i64,
    /// Relative share of traffic within a priority tier
    #[serde(default)]
    pub weight: u32,
    /// Whether classified failures may auto-disable this channel
    #[serde(default = "default_true")]
    pub auto_ban: bool,
    /// Cap on used quota, enables quota limiting when present
    #[serde(default)]
    pub quota_limit: Option<i64>,
    /// Cap on used request count, enables count limiting when present
    #[serde(default)]
    pub count_limit: Option<i64>,
    /// Requests per wall-clock minute, enables RPM limiting when present
    #[serde(default)]
    pub rpm_limit: Option<i64>,
    /// Cool-down after which an auto-disabled channel is re-enabled
    #[serde(default)]
    pub auto_reset: Option<String>,
    /// Status used when no persisted state exists yet
    #[serde(default)]
    pub status: InitialStatus,
}

/// Upstream flavour of a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelKind {
    #[default]
    Openai,
    Anthropic,
    Gemini,
    Task,
    Other,
}

/// Status a channel starts in before anything was persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialStatus {
    #[default]
    Enabled,
    ManuallyDisabled,
}

fn default_groups() -> Vec<String> {
    vec!["default".to_owned()]
}

#[allow(clippy::missing_const_for_fn)]
fn default_true() -> bool {
    true
}
