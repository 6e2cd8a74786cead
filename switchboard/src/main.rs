#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use std::path::PathBuf;

use args::Args;
use clap::Parser;
use switchboard_config::{Config, RelaySettings, SettingsHandle};
use switchboard_server::{Server, build_gateway};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;
    if let Some(listen) = args.listen {
        config.server.listen_address = Some(listen);
    }

    // Initialize telemetry
    let telemetry = switchboard_telemetry::init(config.telemetry.as_ref(), &args.log)?;

    tracing::info!(
        config_path = %args.config.display(),
        "starting switchboard"
    );

    let gateway = build_gateway(&config).await?;
    let services = gateway.services.clone();
    let server = Server::new(&config, gateway.services)?;

    // Set up graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    let sweeper = tokio::spawn(gateway.sweeper.run(shutdown.clone()));
    tokio::spawn(reload_on_hangup(args.config.clone(), services.settings.clone(), shutdown.clone()));

    // Run server
    server.serve(shutdown.clone()).await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "channel sweeper ended abnormally");
    }
    services.ledger.flush().await;

    if let Err(e) = telemetry.force_flush() {
        tracing::warn!(error = %e, "final metrics flush failed");
    }

    tracing::info!("switchboard stopped");
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}

/// Re-read `[relay]` from the config file on every `SIGHUP`
///
/// Channel definitions and the server section need a restart.
#[cfg(unix)]
async fn reload_on_hangup(path: PathBuf, settings: SettingsHandle, shutdown: CancellationToken) {
    let mut hangup = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        .expect("failed to install SIGHUP handler");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            received = hangup.recv() => {
                if received.is_none() {
                    break;
                }

                match Config::load(&path).and_then(|config| RelaySettings::from_config(&config.relay)) {
                    Ok(relay) => {
                        tracing::info!(
                            retry_times = relay.retry_times,
                            sweep_interval = ?relay.sweep_interval,
                            "relay settings reloaded"
                        );
                        settings.replace(relay);
                    }
                    Err(e) => tracing::warn!(error = %e, "relay settings reload failed, keeping current settings"),
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn reload_on_hangup(_path: PathBuf, _settings: SettingsHandle, shutdown: CancellationToken) {
    shutdown.cancelled().await;
}
