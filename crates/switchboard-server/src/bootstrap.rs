//! Wiring of the shared relay collaborators

use std::sync::Arc;

use anyhow::Context;
use switchboard_channel::{
    ChannelHealth, ChannelRegistry, ChannelSweeper, LogNotifier, NotifierSet, UsageLedger, WebhookNotifier, store,
};
use switchboard_config::{Config, RelaySettings, SettingsHandle};
use switchboard_relay::{RelayServices, StatusQueue, TracingErrorLog};

/// Everything a running gateway shares between requests
#[derive(Debug)]
pub struct Gateway {
    pub services: RelayServices,
    pub sweeper: ChannelSweeper,
}

/// Build the registry, hydrate it from storage and start the background
/// writers
///
/// # Errors
///
/// Returns an error if the channels or relay settings are invalid, or if
/// the store cannot be reached
pub async fn build_gateway(config: &Config) -> anyhow::Result<Gateway> {
    let registry = Arc::new(ChannelRegistry::from_config(&config.channels)?);
    let store = store::from_config(&config.storage).context("failed to open channel store")?;
    registry
        .hydrate(store.as_ref())
        .await
        .context("failed to load channel state")?;

    let settings = SettingsHandle::new(RelaySettings::from_config(&config.relay)?);

    let mut notifier = NotifierSet::default().with(LogNotifier);
    if let Some(ref endpoint) = config.relay.notify_webhook {
        notifier = notifier.with(WebhookNotifier::spawn(endpoint.clone()));
    }

    let health = ChannelHealth::new(Arc::clone(&registry), Arc::clone(&store), Arc::new(notifier));
    let ledger = UsageLedger::spawn(Arc::clone(&registry), Arc::clone(&store), settings.clone());
    let statuses = StatusQueue::spawn(health.clone(), settings.clone());
    let shared = store.is_shared();
    let sweeper = ChannelSweeper::new(health.clone(), store, settings.clone()).with_ledger(ledger.clone());

    tracing::info!(channels = registry.len(), shared_store = shared, "channel registry ready");

    Ok(Gateway {
        services: RelayServices {
            health,
            ledger,
            settings,
            statuses,
            error_log: Arc::new(TracingErrorLog),
        },
        sweeper,
    })
}
