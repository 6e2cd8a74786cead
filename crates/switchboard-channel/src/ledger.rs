//! Usage counters: charged in memory at once, persisted directly or in batches

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use switchboard_config::SettingsHandle;
use switchboard_ratelimit::MinuteBucket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::{ChannelId, ChannelRegistry, ChannelStore};

enum Message {
    Usage { id: ChannelId, quota: i64, count: i64 },
    Bucket { id: ChannelId, bucket: MinuteBucket },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default, Clone, Copy)]
struct Pending {
    quota: i64,
    count: i64,
    bucket: Option<MinuteBucket>,
}

impl Pending {
    const fn is_empty(&self) -> bool {
        self.quota == 0 && self.count == 0 && self.bucket.is_none()
    }
}

/// Handle to the usage ledger
///
/// Writes go to a single background task; with `batch_update` on it
/// aggregates per channel and flushes every `batch_interval`. Failed writes
/// stay queued for the next flush.
#[derive(Clone)]
pub struct UsageLedger {
    tx: mpsc::UnboundedSender<Message>,
    registry: Arc<ChannelRegistry>,
}

impl UsageLedger {
    /// Spawn the writer task; it drains and exits once every handle is dropped
    #[must_use]
    pub fn spawn(registry: Arc<ChannelRegistry>, store: Arc<dyn ChannelStore>, settings: SettingsHandle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(rx, store, settings));
        Self { tx, registry }
    }

    /// Add usage to a channel
    pub fn charge(&self, id: ChannelId, quota: i64, count: i64) {
        let Some(slot) = self.registry.get(id) else {
            tracing::warn!(channel_id = %id, "usage charged to unknown channel");
            return;
        };

        slot.charge(quota, count);
        self.send(Message::Usage { id, quota, count });
    }

    /// Persist the latest minute bucket of a channel
    pub fn record_bucket(&self, id: ChannelId, bucket: MinuteBucket) {
        self.send(Message::Bucket { id, bucket });
    }

    /// Wait until everything queued so far has been written (or re-queued)
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Message::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    fn send(&self, message: Message) {
        if self.tx.send(message).is_err() {
            tracing::warn!("usage ledger is closed, dropping usage update");
        }
    }
}

impl std::fmt::Debug for UsageLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UsageLedger").finish_non_exhaustive()
    }
}

async fn write_loop(mut rx: mpsc::UnboundedReceiver<Message>, store: Arc<dyn ChannelStore>, settings: SettingsHandle) {
    let mut pending: HashMap<ChannelId, Pending> = HashMap::new();
    let mut deadline = Instant::now() + flush_period(&settings);

    loop {
        tokio::select! {
            message = rx.recv() => match message {
                Some(Message::Usage { id, quota, count }) => {
                    let entry = pending.entry(id).or_default();
                    entry.quota += quota;
                    entry.count += count;

                    if !settings.current().batch_update {
                        flush_pending(store.as_ref(), &mut pending).await;
                    }
                }
                Some(Message::Bucket { id, bucket }) => {
                    pending.entry(id).or_default().bucket = Some(bucket);

                    if !settings.current().batch_update {
                        flush_pending(store.as_ref(), &mut pending).await;
                    }
                }
                Some(Message::Flush(ack)) => {
                    flush_pending(store.as_ref(), &mut pending).await;
                    let _ = ack.send(());
                }
                None => {
                    flush_pending(store.as_ref(), &mut pending).await;
                    break;
                }
            },
            () = tokio::time::sleep_until(deadline) => {
                flush_pending(store.as_ref(), &mut pending).await;
                deadline = Instant::now() + flush_period(&settings);
            }
        }
    }

    if !pending.is_empty() {
        tracing::warn!(channels = pending.len(), "usage ledger stopped with unwritten usage");
    }

    tracing::debug!("usage ledger shutting down");
}

fn flush_period(settings: &SettingsHandle) -> Duration {
    settings.current().batch_interval.max(Duration::from_secs(1))
}

async fn flush_pending(store: &dyn ChannelStore, pending: &mut HashMap<ChannelId, Pending>) {
    if pending.is_empty() {
        return;
    }

    let batch = std::mem::take(pending);
    let mut requeued = 0_usize;

    for (id, mut entry) in batch {
        if entry.quota != 0 || entry.count != 0 {
            match store.increment_usage(id, entry.quota, entry.count).await {
                Ok(()) => {
                    entry.quota = 0;
                    entry.count = 0;
                }
                Err(e) => tracing::warn!(channel_id = %id, error = %e, "failed to write channel usage"),
            }
        }

        if let Some(bucket) = entry.bucket {
            match store.save_rpm_bucket(id, bucket).await {
                Ok(()) => entry.bucket = None,
                Err(e) => tracing::warn!(channel_id = %id, error = %e, "failed to write rpm bucket"),
            }
        }

        if !entry.is_empty() {
            pending.insert(id, entry);
            requeued += 1;
        }
    }

    if requeued > 0 {
        tracing::warn!(channels = requeued, "usage writes re-queued");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::health::tests::definition;
    use crate::store::{MemoryStore, StatusUpdate};
    use crate::{ChannelState, StoreError};

    #[derive(Debug, Default)]
    struct CountingStore {
        inner: MemoryStore,
        increments: AtomicU32,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl ChannelStore for CountingStore {
        async fn load(&self, id: ChannelId) -> Result<Option<ChannelState>, StoreError> {
            self.inner.load(id).await
        }

        async fn insert(&self, id: ChannelId, state: &ChannelState) -> Result<(), StoreError> {
            self.inner.insert(id, state).await
        }

        async fn compare_and_set_status(&self, id: ChannelId, update: &StatusUpdate) -> Result<bool, StoreError> {
            self.inner.compare_and_set_status(id, update).await
        }

        async fn increment_usage(&self, id: ChannelId, quota: i64, count: i64) -> Result<(), StoreError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Redis("connection refused".to_owned()));
            }

            self.increments.fetch_add(1, Ordering::SeqCst);
            self.inner.increment_usage(id, quota, count).await
        }

        async fn save_rpm_bucket(&self, id: ChannelId, bucket: MinuteBucket) -> Result<(), StoreError> {
            self.inner.save_rpm_bucket(id, bucket).await
        }
    }

    const ID: ChannelId = ChannelId::new(1);

    fn setup(batch_update: bool, failures: u32) -> (UsageLedger, Arc<CountingStore>, Arc<ChannelRegistry>) {
        let registry = Arc::new(ChannelRegistry::from_definitions(vec![definition(1)]).unwrap());
        let store = Arc::new(CountingStore {
            failures_left: AtomicU32::new(failures),
            ..CountingStore::default()
        });
        let settings = SettingsHandle::default();
        settings.update(|s| {
            s.batch_update = batch_update;
            s.batch_interval = Duration::from_secs(3600);
        });

        let ledger = UsageLedger::spawn(Arc::clone(&registry), Arc::clone(&store) as Arc<dyn ChannelStore>, settings);
        (ledger, store, registry)
    }

    #[tokio::test]
    async fn charge_updates_cache_immediately() {
        let (ledger, _store, registry) = setup(true, 0);

        ledger.charge(ID, 250, 1);

        let slot = registry.slot(ID).unwrap();
        assert_eq!((slot.used_quota(), slot.used_count()), (250, 1));
    }

    #[tokio::test]
    async fn direct_mode_writes_each_charge() {
        let (ledger, store, _registry) = setup(false, 0);

        for _ in 0..3 {
            ledger.charge(ID, 10, 1);
        }
        ledger.flush().await;

        assert_eq!(store.increments.load(Ordering::SeqCst), 3);
        let stored = store.load(ID).await.unwrap().unwrap();
        assert_eq!((stored.used_quota, stored.used_count), (30, 3));
    }

    #[tokio::test]
    async fn batch_mode_aggregates_per_channel() {
        let (ledger, store, _registry) = setup(true, 0);

        for _ in 0..5 {
            ledger.charge(ID, 10, 1);
        }
        ledger.record_bucket(ID, MinuteBucket { minute: 7, used: 5 });
        ledger.flush().await;

        assert_eq!(store.increments.load(Ordering::SeqCst), 1);
        let stored = store.load(ID).await.unwrap().unwrap();
        assert_eq!((stored.used_quota, stored.used_count), (50, 5));
        assert_eq!(stored.rpm_bucket, MinuteBucket { minute: 7, used: 5 });
    }

    #[tokio::test]
    async fn failed_flush_is_retried_not_dropped() {
        let (ledger, store, _registry) = setup(true, 1);

        ledger.charge(ID, 40, 2);
        ledger.flush().await;
        assert!(store.load(ID).await.unwrap().is_none());

        ledger.charge(ID, 10, 1);
        ledger.flush().await;

        let stored = store.load(ID).await.unwrap().unwrap();
        assert_eq!((stored.used_quota, stored.used_count), (50, 3));
    }

    #[tokio::test]
    async fn unknown_channel_is_ignored() {
        let (ledger, store, _registry) = setup(false, 0);

        ledger.charge(ChannelId::new(99), 10, 1);
        ledger.flush().await;

        assert_eq!(store.increments.load(Ordering::SeqCst), 0);
    }
}
