//! Channel status state machine

use std::sync::Arc;

use serde::Serialize;

use crate::store::StatusUpdate;
use crate::{
    ChannelError, ChannelEvent, ChannelId, ChannelRegistry, ChannelSlot, ChannelStatus, ChannelStore, Notifier,
    StatusRecord, metrics, unix_now,
};

/// What asked for a status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    /// Status code in the immediate-disable set
    ImmediateDisable,
    /// Failure judged fatal for the channel by the classifier
    ClassifiedFailure,
    /// Periodic quota/count check
    QuotaSweep,
    /// Cool-down of an auto-disabled channel elapsed
    AutoReset,
    /// A request to an auto-disabled channel succeeded
    AutomaticEnable,
    /// Operator action
    Admin,
}

impl Trigger {
    /// Triggers derived from a failed dispatch, subject to the auto-ban flag
    const fn is_failure(self) -> bool {
        matches!(self, Self::ImmediateDisable | Self::ClassifiedFailure)
    }
}

/// Result of a transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed { from: ChannelStatus, to: ChannelStatus },
    /// The channel already was in the requested status
    Unchanged,
    /// The channel opted out of automatic disabling
    Suppressed,
}

impl Transition {
    pub const fn changed(self) -> bool {
        matches!(self, Self::Changed { .. })
    }
}

/// Single entry point for channel status changes
///
/// Transitions of one channel are serialised. The cached status is flipped
/// before the store write so the hot path stops selecting a channel as
/// soon as the decision is made.
#[derive(Debug, Clone)]
pub struct ChannelHealth {
    registry: Arc<ChannelRegistry>,
    store: Arc<dyn ChannelStore>,
    notifier: Arc<dyn Notifier>,
}

impl ChannelHealth {
    pub fn new(registry: Arc<ChannelRegistry>, store: Arc<dyn ChannelStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            registry,
            store,
            notifier,
        }
    }

    pub const fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub async fn disable_auto(
        &self,
        id: ChannelId,
        reason: impl Into<String>,
        trigger: Trigger,
    ) -> Result<Transition, ChannelError> {
        self.transition(id, ChannelStatus::AutoDisabled, Some(reason.into()), trigger)
            .await
    }

    pub async fn enable_auto(&self, id: ChannelId, trigger: Trigger) -> Result<Transition, ChannelError> {
        self.transition(id, ChannelStatus::Enabled, None, trigger).await
    }

    pub async fn disable_manual(&self, id: ChannelId, reason: Option<String>) -> Result<Transition, ChannelError> {
        self.transition(id, ChannelStatus::ManuallyDisabled, reason, Trigger::Admin)
            .await
    }

    pub async fn enable_manual(&self, id: ChannelId) -> Result<Transition, ChannelError> {
        self.transition(id, ChannelStatus::Enabled, None, Trigger::Admin).await
    }

    pub async fn transition(
        &self,
        id: ChannelId,
        target: ChannelStatus,
        reason: Option<String>,
        trigger: Trigger,
    ) -> Result<Transition, ChannelError> {
        self.transition_at(id, target, reason, trigger, unix_now()).await
    }

    /// Move channel `id` to `target` as of unix time `now`
    pub async fn transition_at(
        &self,
        id: ChannelId,
        target: ChannelStatus,
        reason: Option<String>,
        trigger: Trigger,
        now: i64,
    ) -> Result<Transition, ChannelError> {
        let slot = self.registry.slot(id)?;
        let _guard = slot.lock_transition().await;

        let current = slot.status_record();
        if current.status == target {
            return Ok(Transition::Unchanged);
        }

        if trigger.is_failure() && !slot.definition().auto_ban {
            tracing::debug!(channel_id = %id, %trigger, "auto-ban is off, channel stays enabled");
            return Ok(Transition::Suppressed);
        }

        if !is_allowed(current.status, target, trigger) {
            return Err(ChannelError::IllegalTransition {
                id,
                from: current.status,
                to: target,
                trigger,
            });
        }

        let update = next_record(&slot, &current, target, reason, trigger, now);

        slot.apply_status(update.record.clone());
        if update.reset_used_count {
            slot.reset_used_count();
        }

        match self.store.compare_and_set_status(id, &update).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(channel_id = %id, expected = %current.status, "stored channel status diverged from cache");
                return Err(ChannelError::Conflict {
                    id,
                    expected: current.status,
                });
            }
            Err(e) => {
                tracing::error!(channel_id = %id, error = %e, "failed to persist channel status");
                return Err(e.into());
            }
        }

        if target == ChannelStatus::AutoDisabled {
            metrics::record_disabled(id, trigger);
        }

        self.notifier.notify(&ChannelEvent {
            channel_id: id,
            channel_name: slot.name().to_owned(),
            from: current.status,
            to: target,
            trigger,
            reason: update.record.reason,
            at: now,
        });

        Ok(Transition::Changed {
            from: current.status,
            to: target,
        })
    }
}

const fn is_allowed(from: ChannelStatus, to: ChannelStatus, trigger: Trigger) -> bool {
    use ChannelStatus::{AutoDisabled, Enabled, ManuallyDisabled};

    match (from, to) {
        (Enabled, AutoDisabled) => matches!(
            trigger,
            Trigger::ImmediateDisable | Trigger::ClassifiedFailure | Trigger::QuotaSweep
        ),
        (AutoDisabled, Enabled) => matches!(trigger, Trigger::AutoReset | Trigger::AutomaticEnable | Trigger::Admin),
        (Enabled | AutoDisabled, ManuallyDisabled) | (ManuallyDisabled, Enabled) => matches!(trigger, Trigger::Admin),
        _ => false,
    }
}

fn next_record(
    slot: &ChannelSlot,
    current: &StatusRecord,
    target: ChannelStatus,
    reason: Option<String>,
    trigger: Trigger,
    now: i64,
) -> StatusUpdate {
    let auto_reset = slot.definition().auto_reset;

    let record = match (target, trigger) {
        (ChannelStatus::AutoDisabled, _) => StatusRecord {
            status: target,
            reason,
            status_time: Some(now),
            last_disable_time: auto_reset.enabled.then_some(now),
            auto_reset_time: current.auto_reset_time,
        },
        (ChannelStatus::Enabled, Trigger::AutoReset) => StatusRecord {
            status: target,
            reason: None,
            status_time: None,
            last_disable_time: None,
            auto_reset_time: Some(now),
        },
        _ => StatusRecord {
            status: target,
            reason,
            status_time: Some(now),
            last_disable_time: None,
            auto_reset_time: current.auto_reset_time,
        },
    };

    StatusUpdate {
        expected: current.status,
        record,
        reset_used_count: trigger == Trigger::AutoReset,
    }
}
