//! Background worker for status changes decided on the request path

use switchboard_channel::{ChannelError, ChannelHealth, ChannelId, Transition, Trigger};
use switchboard_config::SettingsHandle;
use tokio::sync::{mpsc, oneshot};

use crate::KeywordMatcher;
use crate::classify::should_disable_channel;
use crate::error::UpstreamError;

enum Job {
    DisableOnFailure { channel: ChannelId, error: UpstreamError },
    EnableOnSuccess { channel: ChannelId },
    Idle(oneshot::Sender<()>),
}

/// Queue of status changes that must not delay the caller
///
/// Jobs outlive the request that queued them; a disconnecting caller does
/// not cancel a decision already made. The worker looks the channel up
/// again instead of trusting what the request saw.
#[derive(Clone)]
pub struct StatusQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl StatusQueue {
    /// Spawn the worker; it exits once every handle is dropped
    #[must_use]
    pub fn spawn(health: ChannelHealth, settings: SettingsHandle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker {
            health,
            settings,
            keywords: KeywordMatcher::new(),
        };

        tokio::spawn(worker.run(rx));
        Self { tx }
    }

    /// Disable `channel` if the failure is fatal for it
    pub fn disable_on_failure(&self, channel: ChannelId, error: UpstreamError) {
        self.send(Job::DisableOnFailure { channel, error });
    }

    /// Bring an auto-disabled channel back after it served a request
    pub fn enable_on_success(&self, channel: ChannelId) {
        self.send(Job::EnableOnSuccess { channel });
    }

    /// Wait until every job queued so far has been handled
    pub async fn idle(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Job::Idle(ack)).is_ok() {
            let _ = done.await;
        }
    }

    fn send(&self, job: Job) {
        if self.tx.send(job).is_err() {
            tracing::warn!("status queue is closed, dropping status change");
        }
    }
}

impl std::fmt::Debug for StatusQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusQueue").finish_non_exhaustive()
    }
}

struct Worker {
    health: ChannelHealth,
    settings: SettingsHandle,
    keywords: KeywordMatcher,
}

impl Worker {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = rx.recv().await {
            match job {
                Job::DisableOnFailure { channel, error } => self.disable_on_failure(channel, &error).await,
                Job::EnableOnSuccess { channel } => self.enable_on_success(channel).await,
                Job::Idle(ack) => {
                    let _ = ack.send(());
                }
            }
        }
    }

    async fn disable_on_failure(&self, channel: ChannelId, error: &UpstreamError) {
        let Some(slot) = self.health.registry().get(channel).cloned() else {
            tracing::warn!(channel_id = %channel, "disable requested for unknown channel");
            return;
        };

        let settings = self.settings.current();
        if !should_disable_channel(slot.definition().kind, error, &settings, &self.keywords) {
            return;
        }

        let reason = format!("status code {}: {}", error.status, error.message);
        let result = self
            .health
            .disable_auto(channel, reason, Trigger::ClassifiedFailure)
            .await;
        log_outcome(channel, "disable", result);
    }

    async fn enable_on_success(&self, channel: ChannelId) {
        let result = self.health.enable_auto(channel, Trigger::AutomaticEnable).await;
        log_outcome(channel, "enable", result);
    }
}

fn log_outcome(channel: ChannelId, action: &str, result: Result<Transition, ChannelError>) {
    match result {
        Ok(Transition::Changed { to, .. }) => {
            tracing::debug!(channel_id = %channel, status = %to, "{action} applied");
        }
        Ok(Transition::Unchanged | Transition::Suppressed) => {}
        // Admin-disabled channels stay where the operator put them
        Err(ChannelError::IllegalTransition { .. }) => {}
        Err(e) => tracing::warn!(channel_id = %channel, error = %e, "{action} failed"),
    }
}
