use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use switchboard_ratelimit::MinuteBucket;

use super::{ChannelStore, StatusUpdate};
use crate::{ChannelId, ChannelState, StoreError};

/// Process-local store; state is lost on restart
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: DashMap<ChannelId, ChannelState>,
}

#[async_trait]
impl ChannelStore for MemoryStore {
    async fn load(&self, id: ChannelId) -> Result<Option<ChannelState>, StoreError> {
        Ok(self.records.get(&id).map(|record| record.clone()))
    }

    async fn insert(&self, id: ChannelId, state: &ChannelState) -> Result<(), StoreError> {
        self.records.entry(id).or_insert_with(|| state.clone());
        Ok(())
    }

    async fn compare_and_set_status(&self, id: ChannelId, update: &StatusUpdate) -> Result<bool, StoreError> {
        let mut record = match self.records.entry(id) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => entry.insert(ChannelState::default()),
        };

        if record.status.status != update.expected {
            return Ok(false);
        }

        record.status = update.record.clone();
        if update.reset_used_count {
            record.used_count = 0;
        }

        Ok(true)
    }

    async fn increment_usage(&self, id: ChannelId, quota: i64, count: i64) -> Result<(), StoreError> {
        let mut record = self.records.entry(id).or_default();
        record.used_quota += quota;
        record.used_count += count;
        Ok(())
    }

    async fn save_rpm_bucket(&self, id: ChannelId, bucket: MinuteBucket) -> Result<(), StoreError> {
        self.records.entry(id).or_default().rpm_bucket = bucket;
        Ok(())
    }
}
