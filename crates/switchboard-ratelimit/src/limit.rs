use serde::Serialize;

/// An optional numeric ceiling
///
/// A limit of zero or below never restricts anything, even when enabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LimitSetting {
    pub enabled: bool,
    pub limit: i64,
}

impl LimitSetting {
    pub const fn disabled() -> Self {
        Self { enabled: false, limit: 0 }
    }

    pub const fn of(limit: i64) -> Self {
        Self { enabled: true, limit }
    }

    /// The ceiling when it actually restricts usage
    pub const fn active(self) -> Option<i64> {
        if self.enabled && self.limit > 0 {
            Some(self.limit)
        } else {
            None
        }
    }
}

impl From<Option<i64>> for LimitSetting {
    fn from(limit: Option<i64>) -> Self {
        limit.map_or_else(Self::disabled, Self::of)
    }
}
