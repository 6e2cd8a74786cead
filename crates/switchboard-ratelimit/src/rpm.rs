use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use switchboard_config::ChannelConfig;

use crate::{LimitSetting, RateLimitError};

/// Requests counted against one wall-clock minute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinuteBucket {
    /// Minutes since the unix epoch
    pub minute: i64,
    pub used: i64,
}

impl MinuteBucket {
    /// Bucket as seen at `now`: a bucket from an earlier minute counts as empty
    const fn at(self, now: i64) -> Self {
        let minute = minute_of(now);
        if self.minute == minute { self } else { Self { minute, used: 0 } }
    }
}

/// Wall-clock minute containing the unix timestamp `now`
pub const fn minute_of(now: i64) -> i64 {
    now.div_euclid(60)
}

/// Requests-per-minute gate for a single channel
///
/// Every read-modify-write of the bucket happens under one lock, so
/// concurrent callers can never push usage past the limit.
#[derive(Debug)]
pub struct RpmGate {
    limit: LimitSetting,
    bucket: Mutex<MinuteBucket>,
}

impl RpmGate {
    pub const fn new(limit: LimitSetting) -> Self {
        Self {
            limit,
            bucket: Mutex::new(MinuteBucket { minute: 0, used: 0 }),
        }
    }

    pub fn from_config(config: &ChannelConfig) -> Self {
        Self::new(LimitSetting::from(config.rpm_limit))
    }

    pub const fn limit(&self) -> LimitSetting {
        self.limit
    }

    /// Whether a request would be admitted at `now`
    ///
    /// Read-only: a stale bucket is treated as empty but not rewritten.
    pub fn check(&self, now: i64) -> bool {
        let Some(limit) = self.limit.active() else {
            return true;
        };

        self.lock().at(now).used < limit
    }

    /// Count one request at `now`, rolling the bucket over first if needed
    pub fn increment(&self, now: i64) -> MinuteBucket {
        let mut bucket = self.lock();
        *bucket = bucket.at(now);
        bucket.used += 1;
        *bucket
    }

    /// Admit and count one request in a single critical section
    ///
    /// Returns the updated bucket so the caller can persist it. With RPM
    /// limiting off this always succeeds and still counts the request.
    pub fn try_acquire(&self, now: i64) -> Result<MinuteBucket, RateLimitError> {
        let mut bucket = self.lock();
        let current = bucket.at(now);

        if let Some(limit) = self.limit.active()
            && current.used >= limit
        {
            *bucket = current;
            let retry_after = u64::try_from(60 - now.rem_euclid(60)).unwrap_or(60);

            return Err(RateLimitError::Exceeded {
                limit,
                used: current.used,
                retry_after,
            });
        }

        *bucket = MinuteBucket {
            used: current.used + 1,
            ..current
        };

        Ok(*bucket)
    }

    /// Current bucket contents
    pub fn bucket(&self) -> MinuteBucket {
        *self.lock()
    }

    /// Replace the bucket with a persisted one
    ///
    /// A bucket from an older minute than the live one is ignored.
    pub fn restore(&self, persisted: MinuteBucket) {
        let mut bucket = self.lock();
        if persisted.minute > bucket.minute || (persisted.minute == bucket.minute && persisted.used > bucket.used) {
            *bucket = persisted;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MinuteBucket> {
        self.bucket.lock().unwrap_or_else(|e| e.into_inner())
    }
}
