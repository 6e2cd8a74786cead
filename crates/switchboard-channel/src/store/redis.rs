use std::collections::HashMap;

use async_trait::async_trait;
use redis::AsyncCommands;
use switchboard_ratelimit::MinuteBucket;

use super::{ChannelStore, StatusUpdate};
use crate::{ChannelId, ChannelState, ChannelStatus, StatusRecord, StoreError};

const INSERT_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
    return 0
end
redis.call('HSET', KEYS[1],
    'status', ARGV[1],
    'status_meta', ARGV[2],
    'used_quota', ARGV[3],
    'used_count', ARGV[4],
    'rpm_minute', ARGV[5],
    'rpm_used', ARGV[6])
return 1
";

const COMPARE_AND_SET_SCRIPT: &str = r"
if redis.call('HGET', KEYS[1], 'status') ~= ARGV[1] then
    return 0
end
redis.call('HSET', KEYS[1], 'status', ARGV[2], 'status_meta', ARGV[3])
if ARGV[4] == '1' then
    redis.call('HSET', KEYS[1], 'used_count', 0)
end
return 1
";

/// Redis-backed store shared by every gateway instance
///
/// Each channel is one hash at `<prefix>:channel:<id>`. The status name is
/// kept in its own field so the compare-and-set script can test it.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    prefix: String,
    insert: redis::Script,
    compare_and_set: redis::Script,
}

impl RedisStore {
    pub fn new(url: &str, prefix: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Redis(format!("failed to connect to Redis: {e}")))?;

        Ok(Self {
            client,
            prefix: prefix.to_owned(),
            insert: redis::Script::new(INSERT_SCRIPT),
            compare_and_set: redis::Script::new(COMPARE_AND_SET_SCRIPT),
        })
    }

    fn key(&self, id: ChannelId) -> String {
        format!("{}:channel:{id}", self.prefix)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Redis(format!("failed to get connection: {e}")))
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelStore for RedisStore {
    async fn load(&self, id: ChannelId) -> Result<Option<ChannelState>, StoreError> {
        let mut conn = self.connection().await?;
        let fields: HashMap<String, String> = conn.hgetall(self.key(id)).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        parse_state(id, &fields).map(Some)
    }

    async fn insert(&self, id: ChannelId, state: &ChannelState) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let status: &'static str = state.status.status.into();

        let _: i32 = self
            .insert
            .key(self.key(id))
            .arg(status)
            .arg(encode_meta(id, &state.status)?)
            .arg(state.used_quota)
            .arg(state.used_count)
            .arg(state.rpm_bucket.minute)
            .arg(state.rpm_bucket.used)
            .invoke_async(&mut conn)
            .await?;

        Ok(())
    }

    async fn compare_and_set_status(&self, id: ChannelId, update: &StatusUpdate) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let expected: &'static str = update.expected.into();
        let next: &'static str = update.record.status.into();

        let applied: i32 = self
            .compare_and_set
            .key(self.key(id))
            .arg(expected)
            .arg(next)
            .arg(encode_meta(id, &update.record)?)
            .arg(if update.reset_used_count { "1" } else { "0" })
            .invoke_async(&mut conn)
            .await?;

        Ok(applied == 1)
    }

    async fn increment_usage(&self, id: ChannelId, quota: i64, count: i64) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = self.key(id);

        redis::pipe()
            .atomic()
            .hincr(&key, "used_quota", quota)
            .hincr(&key, "used_count", count)
            .query_async::<()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn save_rpm_bucket(&self, id: ChannelId, bucket: MinuteBucket) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;

        let () = conn
            .hset_multiple(self.key(id), &[("rpm_minute", bucket.minute), ("rpm_used", bucket.used)])
            .await?;

        Ok(())
    }

    fn is_shared(&self) -> bool {
        true
    }
}

fn encode_meta(id: ChannelId, record: &StatusRecord) -> Result<String, StoreError> {
    serde_json::to_string(record).map_err(|e| StoreError::Corrupt {
        id,
        reason: e.to_string(),
    })
}

fn parse_state(id: ChannelId, fields: &HashMap<String, String>) -> Result<ChannelState, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt { id, reason };

    let status = fields
        .get("status")
        .ok_or_else(|| corrupt("missing status".to_owned()))?
        .parse::<ChannelStatus>()
        .map_err(|e| corrupt(format!("status: {e}")))?;

    let mut record = match fields.get("status_meta") {
        Some(raw) => serde_json::from_str::<StatusRecord>(raw).map_err(|e| corrupt(format!("status_meta: {e}")))?,
        None => StatusRecord::default(),
    };
    record.status = status;

    let number = |name: &str| -> Result<i64, StoreError> {
        fields
            .get(name)
            .map_or(Ok(0), |raw| raw.parse().map_err(|e| corrupt(format!("{name}: {e}"))))
    };

    Ok(ChannelState {
        status: record,
        used_quota: number("used_quota")?,
        used_count: number("used_count")?,
        rpm_bucket: MinuteBucket {
            minute: number("rpm_minute")?,
            used: number("rpm_used")?,
        },
    })
}
