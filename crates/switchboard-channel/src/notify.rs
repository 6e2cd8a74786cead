//! Operator notifications for channel status changes

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use url::Url;

use crate::{ChannelId, ChannelStatus, Trigger};

/// A completed status transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelEvent {
    pub channel_id: ChannelId,
    pub channel_name: String,
    pub from: ChannelStatus,
    pub to: ChannelStatus,
    pub trigger: Trigger,
    pub reason: Option<String>,
    /// Unix seconds
    pub at: i64,
}

impl ChannelEvent {
    /// One-line human summary
    pub fn summary(&self) -> String {
        let verb = match self.to {
            ChannelStatus::Enabled => "was re-enabled",
            ChannelStatus::AutoDisabled => "was automatically disabled",
            ChannelStatus::ManuallyDisabled => "was disabled by an operator",
        };

        match self.reason {
            Some(ref reason) => format!("channel '{}' (#{}) {verb}: {reason}", self.channel_name, self.channel_id),
            None => format!("channel '{}' (#{}) {verb}", self.channel_name, self.channel_id),
        }
    }
}

/// Receives status change events
///
/// Implementations must return quickly and never fail the caller.
pub trait Notifier: Send + Sync + std::fmt::Debug {
    fn notify(&self, event: &ChannelEvent);
}

/// Writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &ChannelEvent) {
        if event.to.is_enabled() {
            tracing::info!(
                channel_id = %event.channel_id,
                trigger = %event.trigger,
                "{}",
                event.summary()
            );
        } else {
            tracing::warn!(
                channel_id = %event.channel_id,
                trigger = %event.trigger,
                "{}",
                event.summary()
            );
        }
    }
}

/// Posts events as JSON to an operator endpoint from a background task
#[derive(Clone)]
pub struct WebhookNotifier {
    tx: mpsc::UnboundedSender<ChannelEvent>,
}

impl WebhookNotifier {
    /// Spawn the delivery task; it runs until every handle is dropped
    #[must_use]
    pub fn spawn(endpoint: Url) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(deliver(rx, reqwest::Client::new(), endpoint));
        Self { tx }
    }
}

impl std::fmt::Debug for WebhookNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookNotifier").finish_non_exhaustive()
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: &ChannelEvent) {
        if let Err(e) = self.tx.send(event.clone()) {
            tracing::warn!(error = %e, "failed to enqueue channel notification, channel closed");
        }
    }
}

async fn deliver(mut rx: mpsc::UnboundedReceiver<ChannelEvent>, http: reqwest::Client, endpoint: Url) {
    while let Some(event) = rx.recv().await {
        let body = serde_json::json!({
            "subject": event.summary(),
            "event": event,
        });

        match http.post(endpoint.clone()).json(&body).send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    status = response.status().as_u16(),
                    channel_id = %event.channel_id,
                    "channel notification rejected"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, channel_id = %event.channel_id, "failed to deliver channel notification");
            }
        }
    }

    tracing::debug!("channel notifier shutting down");
}

/// Fans an event out to several notifiers
#[derive(Debug, Default, Clone)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    #[must_use]
    pub fn with(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifiers.push(Arc::new(notifier));
        self
    }
}

impl Notifier for NotifierSet {
    fn notify(&self, event: &ChannelEvent) {
        for notifier in &self.notifiers {
            notifier.notify(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn event() -> ChannelEvent {
        ChannelEvent {
            channel_id: ChannelId::new(4),
            channel_name: "backup".to_owned(),
            from: ChannelStatus::Enabled,
            to: ChannelStatus::AutoDisabled,
            trigger: Trigger::QuotaSweep,
            reason: Some("count limit reached: limit 10, used 10".to_owned()),
            at: 1_700_000_000,
        }
    }

    #[test]
    fn summary_mentions_reason() {
        assert_eq!(
            event().summary(),
            "channel 'backup' (#4) was automatically disabled: count limit reached: limit 10, used 10"
        );
    }

    #[tokio::test]
    async fn webhook_posts_event() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/channels"))
            .and(body_partial_json(serde_json::json!({
                "event": { "channel_id": 4, "to": "auto_disabled", "trigger": "quota_sweep" }
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = Url::parse(&format!("{}/hooks/channels", server.uri())).unwrap();
        let notifier = WebhookNotifier::spawn(endpoint);
        notifier.notify(&event());

        for _ in 0..50 {
            if !server.received_requests().await.unwrap_or_default().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        server.verify().await;
    }
}
