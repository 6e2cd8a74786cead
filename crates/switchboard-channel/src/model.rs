use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use switchboard_config::{ChannelConfig, ChannelKind, InitialStatus, parse_duration};
use switchboard_ratelimit::{LimitSetting, MinuteBucket, QuotaGate};
use url::Url;

use crate::ChannelError;

/// Opaque channel identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(u32);

impl ChannelId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for ChannelId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChannelStatus {
    #[default]
    Enabled,
    AutoDisabled,
    ManuallyDisabled,
}

impl ChannelStatus {
    pub const fn is_enabled(self) -> bool {
        matches!(self, Self::Enabled)
    }
}

impl From<InitialStatus> for ChannelStatus {
    fn from(status: InitialStatus) -> Self {
        match status {
            InitialStatus::Enabled => Self::Enabled,
            InitialStatus::ManuallyDisabled => Self::ManuallyDisabled,
        }
    }
}

/// Automatic re-enable after a cool-down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoReset {
    pub enabled: bool,
    pub interval: Duration,
}

impl AutoReset {
    /// Whether a channel disabled at `disabled_at` is due for re-enable at `now`
    pub fn is_due(self, disabled_at: i64, now: i64) -> bool {
        if !self.enabled || self.interval.is_zero() || disabled_at <= 0 {
            return false;
        }

        let interval = i64::try_from(self.interval.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(disabled_at) >= interval
    }
}

/// Status of a channel plus the bookkeeping of its last transition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub status: ChannelStatus,
    /// Why the channel entered its current status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the channel entered its current status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_time: Option<i64>,
    /// Start of the auto-reset cool-down
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_disable_time: Option<i64>,
    /// When auto-reset last re-enabled the channel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_reset_time: Option<i64>,
}

/// Mutable part of a channel, as persisted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelState {
    pub status: StatusRecord,
    pub used_quota: i64,
    pub used_count: i64,
    pub rpm_bucket: MinuteBucket,
}

/// Immutable part of a channel, from configuration
#[derive(Debug)]
pub struct ChannelDefinition {
    pub id: ChannelId,
    pub name: String,
    pub kind: ChannelKind,
    pub base_url: Option<Url>,
    pub api_key: Option<SecretString>,
    pub groups: BTreeSet<String>,
    pub models: BTreeSet<String>,
    pub priority: i64,
    pub weight: u32,
    pub auto_ban: bool,
    pub limits: QuotaGate,
    pub rpm_limit: LimitSetting,
    pub auto_reset: AutoReset,
    pub initial_status: ChannelStatus,
}

impl ChannelDefinition {
    pub fn from_config(config: &ChannelConfig) -> Result<Self, ChannelError> {
        let auto_reset = match config.auto_reset {
            Some(ref raw) => AutoReset {
                enabled: true,
                interval: parse_duration(raw)
                    .map_err(|e| ChannelError::Definition(format!("channel {}: {e}", config.id)))?,
            },
            None => AutoReset::default(),
        };

        Ok(Self {
            id: ChannelId(config.id),
            name: config.name.clone(),
            kind: config.kind,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            groups: trimmed(&config.groups),
            models: trimmed(&config.models),
            priority: config.priority,
            weight: config.weight,
            auto_ban: config.auto_ban,
            limits: QuotaGate::from_config(config),
            rpm_limit: LimitSetting::from(config.rpm_limit),
            auto_reset,
            initial_status: config.status.into(),
        })
    }

    pub fn serves(&self, group: &str, model: &str) -> bool {
        self.groups.contains(group) && self.models.contains(model)
    }
}

fn trimmed(values: &[String]) -> BTreeSet<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Point-in-time view of a channel, safe to expose to operators
#[derive(Debug, Clone, Serialize)]
pub struct ChannelSnapshot {
    pub id: ChannelId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
    pub groups: Vec<String>,
    pub models: Vec<String>,
    pub priority: i64,
    pub weight: u32,
    pub auto_ban: bool,
    #[serde(flatten)]
    pub status: StatusRecord,
    pub used_quota: i64,
    pub used_count: i64,
    pub quota_limit: LimitSetting,
    pub count_limit: LimitSetting,
    pub rpm_limit: LimitSetting,
    pub rpm_bucket: MinuteBucket,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_reset_secs: Option<u64>,
}
