use switchboard_config::ChannelConfig;

use crate::LimitSetting;

/// Which ceiling a channel ran into
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LimitBreach {
    #[error("quota limit reached: limit {limit}, used {used}")]
    Quota { limit: i64, used: i64 },
    #[error("count limit reached: limit {limit}, used {used}")]
    Count { limit: i64, used: i64 },
}

/// Quota and request-count ceilings of a channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuotaGate {
    pub quota: LimitSetting,
    pub count: LimitSetting,
}

impl QuotaGate {
    pub fn from_config(config: &ChannelConfig) -> Self {
        Self {
            quota: LimitSetting::from(config.quota_limit),
            count: LimitSetting::from(config.count_limit),
        }
    }

    /// Whether either ceiling restricts anything
    pub const fn is_limited(&self) -> bool {
        self.quota.active().is_some() || self.count.active().is_some()
    }

    /// The first ceiling that usage has reached, quota checked before count
    pub fn breach(&self, used_quota: i64, used_count: i64) -> Option<LimitBreach> {
        if let Some(limit) = self.quota.active()
            && used_quota >= limit
        {
            return Some(LimitBreach::Quota {
                limit,
                used: used_quota,
            });
        }

        if let Some(limit) = self.count.active()
            && used_count >= limit
        {
            return Some(LimitBreach::Count {
                limit,
                used: used_count,
            });
        }

        None
    }
}
