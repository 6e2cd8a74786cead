//! Test server wrapper that starts the gateway on a random port

use std::net::SocketAddr;

use switchboard_channel::{ChannelId, ChannelStatus};
use switchboard_config::Config;
use switchboard_relay::RelayServices;
use switchboard_server::{Server, build_gateway};
use tokio_util::sync::CancellationToken;

/// A running test server instance
pub struct TestServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    client: reqwest::Client,
    services: RelayServices,
}

impl TestServer {
    /// Start a test server with the given configuration
    ///
    /// Binds to port 0 for automatic port assignment. The channel sweeper
    /// is not started; tests drive state changes directly.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let gateway = build_gateway(&config).await?;
        let services = gateway.services.clone();
        let server = Server::new(&config, gateway.services)?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        // Bind the listener here so we know the actual port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, server.into_router())
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        let client = reqwest::Client::new();

        Ok(Self {
            addr,
            shutdown,
            client,
            services,
        })
    }

    /// Base URL of the running test server
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Get a reference to the HTTP client
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Relay collaborators behind the server
    pub fn services(&self) -> &RelayServices {
        &self.services
    }

    /// Cached status of a channel
    pub fn status(&self, id: u32) -> ChannelStatus {
        self.services
            .registry()
            .get(ChannelId::new(id))
            .expect("known channel")
            .status()
    }

    /// Wait for background status changes and usage writes to land
    pub async fn settle(&self) {
        self.services.statuses.idle().await;
        self.services.ledger.flush().await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
