//! HTTP surface of the gateway

mod admin;
mod bootstrap;
mod error;
mod health;
mod identity;
mod routes;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use switchboard_config::Config;
use switchboard_relay::protocol::{ClaudeProtocol, CompletionProtocol, TaskProtocol};
use switchboard_relay::{Relay, RelayServices};
use tower_http::trace::TraceLayer;

pub use bootstrap::{Gateway, build_gateway};
pub use error::ServerError;
pub use identity::{CHANNEL_HEADER, CallerContext, GROUP_HEADER, REQUEST_ID_HEADER, USER_HEADER};
pub use upstream::HttpUpstream;

/// Per-attempt budget for one upstream call
const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(300);

/// Assembled server with all routes and middleware
pub struct Server {
    router: Router,
    listen_address: SocketAddr,
}

impl Server {
    /// Build the server from configuration and the shared relay services
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be built
    pub fn new(config: &Config, services: RelayServices) -> anyhow::Result<Self> {
        let listen_address = config
            .server
            .listen_address
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

        let upstream = HttpUpstream::new(UPSTREAM_TIMEOUT)?;
        let state = routes::RelayState {
            completion: Arc::new(Relay::new(CompletionProtocol::new(upstream.clone()), services.clone())),
            claude: Arc::new(Relay::new(ClaudeProtocol::new(upstream.clone()), services.clone())),
            task: Arc::new(Relay::new(TaskProtocol::new(upstream), services.clone())),
        };

        let mut app = routes::relay_router(state);

        // Health check
        if config.server.health.enabled {
            let registry = Arc::clone(services.registry());
            app = app.route(
                &config.server.health.path,
                axum::routing::get(health::health_handler).with_state(registry),
            );
        }

        // Channel admin, only with a token to guard it
        if let Some(ref token) = config.server.admin_token {
            app = app.merge(admin::admin_router(services.health, token.clone()));
        }

        let admin_token = config.server.admin_token.clone();
        app = app.layer(axum::middleware::from_fn(move |req, next| {
            let admin_token = admin_token.clone();
            async move { identity::identity_middleware(admin_token, req, next).await }
        }));

        app = app.layer(TraceLayer::new_for_http());

        Ok(Self {
            router: app,
            listen_address,
        })
    }

    /// Get the configured listen address
    #[must_use]
    pub const fn listen_address(&self) -> SocketAddr {
        self.listen_address
    }

    /// Consume the server and return the inner router
    ///
    /// Useful for testing when the caller manages the listener
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Start serving requests
    ///
    /// Blocks until the cancellation token is triggered.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the TCP listener or serving fails
    pub async fn serve(self, shutdown: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.listen_address).await?;
        let local_addr = listener.local_addr()?;
        tracing::info!(%local_addr, "server listening");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                tracing::info!("graceful shutdown initiated");
            })
            .await?;

        Ok(())
    }
}
