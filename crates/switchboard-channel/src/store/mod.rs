//! Persistence of mutable channel state

mod memory;
mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use switchboard_config::StorageConfig;
use switchboard_ratelimit::MinuteBucket;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;
use crate::{ChannelId, ChannelState, ChannelStatus, StatusRecord, StoreError};

/// A status write guarded by the status it replaces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub expected: ChannelStatus,
    pub record: StatusRecord,
    /// Zero the used-count counter in the same write
    pub reset_used_count: bool,
}

/// Durable home of channel status and usage counters
#[async_trait]
pub trait ChannelStore: Send + Sync + std::fmt::Debug {
    async fn load(&self, id: ChannelId) -> Result<Option<ChannelState>, StoreError>;

    /// Write the full state unless a record already exists
    async fn insert(&self, id: ChannelId, state: &ChannelState) -> Result<(), StoreError>;

    /// Apply `update` only if the stored status equals `update.expected`
    ///
    /// Returns whether the write happened.
    async fn compare_and_set_status(&self, id: ChannelId, update: &StatusUpdate) -> Result<bool, StoreError>;

    /// Atomically add to the usage counters
    async fn increment_usage(&self, id: ChannelId, quota: i64, count: i64) -> Result<(), StoreError>;

    async fn save_rpm_bucket(&self, id: ChannelId, bucket: MinuteBucket) -> Result<(), StoreError>;

    /// Whether other gateway instances may write to this store
    fn is_shared(&self) -> bool {
        false
    }
}

/// Build the store selected by configuration
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ChannelStore>, StoreError> {
    match config {
        StorageConfig::Memory => Ok(Arc::new(MemoryStore::default())),
        StorageConfig::Redis(redis) => Ok(Arc::new(RedisStore::new(redis.url.as_str(), &redis.key_prefix)?)),
    }
}
