//! Periodic quota enforcement and auto-reset

use std::sync::Arc;

use switchboard_config::SettingsHandle;
use tokio_util::sync::CancellationToken;

use crate::{ChannelHealth, ChannelStatus, ChannelStore, Trigger, UsageLedger, unix_now};

/// Outcome of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub disabled: usize,
    pub reset: usize,
}

/// Disables channels over their limits and re-enables cooled-down ones
#[derive(Debug, Clone)]
pub struct ChannelSweeper {
    health: ChannelHealth,
    store: Arc<dyn ChannelStore>,
    settings: SettingsHandle,
    ledger: Option<UsageLedger>,
}

impl ChannelSweeper {
    pub fn new(health: ChannelHealth, store: Arc<dyn ChannelStore>, settings: SettingsHandle) -> Self {
        Self {
            health,
            store,
            settings,
            ledger: None,
        }
    }

    /// Flush this ledger before every sweep so persisted counters are current
    #[must_use]
    pub fn with_ledger(mut self, ledger: UsageLedger) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Sweep until cancelled, re-reading the interval every round
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = self.settings.current().sweep_interval;
        tracing::info!(interval_secs = interval.as_secs(), "channel sweeper started");

        loop {
            let current = self.settings.current().sweep_interval;
            if current != interval {
                tracing::info!(
                    from_secs = interval.as_secs(),
                    to_secs = current.as_secs(),
                    "channel sweep interval changed"
                );
                interval = current;
            }

            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }

            if let Some(ref ledger) = self.ledger {
                ledger.flush().await;
            }

            if self.store.is_shared() {
                self.health.registry().refresh(self.store.as_ref()).await;
            }

            let report = self.tick(unix_now()).await;
            if report.disabled > 0 || report.reset > 0 {
                tracing::info!(disabled = report.disabled, reset = report.reset, "channel sweep finished");
            } else {
                tracing::debug!("channel sweep finished without changes");
            }
        }

        tracing::debug!("channel sweeper stopped");
    }

    /// One sweep: limit enforcement first, then auto-reset
    pub async fn tick(&self, now: i64) -> SweepReport {
        SweepReport {
            disabled: self.disable_over_limit(now).await,
            reset: self.reset_expired(now).await,
        }
    }

    /// Auto-disable enabled channels that reached their quota or count limit
    pub async fn disable_over_limit(&self, now: i64) -> usize {
        let mut disabled = 0;

        for slot in self.health.registry().slots() {
            let limits = slot.definition().limits;
            if !limits.is_limited() || slot.status() != ChannelStatus::Enabled {
                continue;
            }

            let Some(breach) = limits.breach(slot.used_quota(), slot.used_count()) else {
                continue;
            };

            match self
                .health
                .transition_at(
                    slot.id(),
                    ChannelStatus::AutoDisabled,
                    Some(breach.to_string()),
                    Trigger::QuotaSweep,
                    now,
                )
                .await
            {
                Ok(transition) if transition.changed() => disabled += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(channel_id = %slot.id(), error = %e, "failed to disable channel over its limit");
                }
            }
        }

        disabled
    }

    /// Re-enable auto-disabled channels whose cool-down has elapsed
    pub async fn reset_expired(&self, now: i64) -> usize {
        let mut reset = 0;

        for slot in self.health.registry().slots() {
            let auto_reset = slot.definition().auto_reset;
            if !auto_reset.enabled {
                continue;
            }

            let record = slot.status_record();
            if record.status != ChannelStatus::AutoDisabled {
                continue;
            }

            let Some(disabled_at) = record.last_disable_time else {
                continue;
            };

            if !auto_reset.is_due(disabled_at, now) {
                continue;
            }

            match self
                .health
                .transition_at(slot.id(), ChannelStatus::Enabled, None, Trigger::AutoReset, now)
                .await
            {
                Ok(transition) if transition.changed() => reset += 1,
                Ok(_) => {}
                Err(e) => tracing::warn!(channel_id = %slot.id(), error = %e, "failed to auto-reset channel"),
            }
        }

        reset
    }
}
