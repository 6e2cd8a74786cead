use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use switchboard_ratelimit::RpmGate;

use crate::{ChannelDefinition, ChannelId, ChannelSnapshot, ChannelState, ChannelStatus, StatusRecord};

/// One channel in the registry arena
///
/// Configuration is immutable; every piece of mutable state sits behind
/// its own accessor so callers cannot bypass the locking.
#[derive(Debug)]
pub struct ChannelSlot {
    definition: ChannelDefinition,
    status: Mutex<StatusRecord>,
    used_quota: AtomicI64,
    used_count: AtomicI64,
    rpm: RpmGate,
    transition: tokio::sync::Mutex<()>,
}

impl ChannelSlot {
    pub fn new(definition: ChannelDefinition) -> Self {
        let status = StatusRecord {
            status: definition.initial_status,
            ..StatusRecord::default()
        };
        let rpm = RpmGate::new(definition.rpm_limit);

        Self {
            definition,
            status: Mutex::new(status),
            used_quota: AtomicI64::new(0),
            used_count: AtomicI64::new(0),
            rpm,
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub const fn id(&self) -> ChannelId {
        self.definition.id
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub const fn definition(&self) -> &ChannelDefinition {
        &self.definition
    }

    pub fn status(&self) -> ChannelStatus {
        self.lock_status().status
    }

    pub fn status_record(&self) -> StatusRecord {
        self.lock_status().clone()
    }

    pub fn used_quota(&self) -> i64 {
        self.used_quota.load(Ordering::Relaxed)
    }

    pub fn used_count(&self) -> i64 {
        self.used_count.load(Ordering::Relaxed)
    }

    /// Requests-per-minute gate of this channel
    pub const fn rpm(&self) -> &RpmGate {
        &self.rpm
    }

    pub fn snapshot(&self) -> ChannelSnapshot {
        let definition = &self.definition;

        ChannelSnapshot {
            id: definition.id,
            name: definition.name.clone(),
            kind: definition.kind,
            groups: definition.groups.iter().cloned().collect(),
            models: definition.models.iter().cloned().collect(),
            priority: definition.priority,
            weight: definition.weight,
            auto_ban: definition.auto_ban,
            status: self.status_record(),
            used_quota: self.used_quota(),
            used_count: self.used_count(),
            quota_limit: definition.limits.quota,
            count_limit: definition.limits.count,
            rpm_limit: definition.rpm_limit,
            rpm_bucket: self.rpm.bucket(),
            auto_reset_secs: definition
                .auto_reset
                .enabled
                .then(|| definition.auto_reset.interval.as_secs()),
        }
    }

    /// Mutable state in its persisted shape
    pub fn state(&self) -> ChannelState {
        ChannelState {
            status: self.status_record(),
            used_quota: self.used_quota(),
            used_count: self.used_count(),
            rpm_bucket: self.rpm.bucket(),
        }
    }

    /// Overwrite cached state with what the store holds
    pub(crate) fn restore(&self, state: &ChannelState) {
        *self.lock_status() = state.status.clone();
        self.used_quota.store(state.used_quota, Ordering::Relaxed);
        self.used_count.store(state.used_count, Ordering::Relaxed);
        self.rpm.restore(state.rpm_bucket);
    }

    pub(crate) fn apply_status(&self, record: StatusRecord) {
        *self.lock_status() = record;
    }

    pub(crate) fn charge(&self, quota: i64, count: i64) {
        self.used_quota.fetch_add(quota, Ordering::Relaxed);
        self.used_count.fetch_add(count, Ordering::Relaxed);
    }

    pub(crate) fn reset_used_count(&self) {
        self.used_count.store(0, Ordering::Relaxed);
    }

    /// Serialises status transitions of this channel
    pub(crate) async fn lock_transition(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.transition.lock().await
    }

    fn lock_status(&self) -> std::sync::MutexGuard<'_, StatusRecord> {
        self.status.lock().unwrap_or_else(|e| e.into_inner())
    }
}
