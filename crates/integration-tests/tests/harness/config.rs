//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use secrecy::SecretString;
use switchboard_config::{
    ChannelConfig, ChannelKind, Config, HealthConfig, InitialStatus, RelayConfig, ServerConfig, StorageConfig,
};

pub const ADMIN_TOKEN: &str = "admin-secret";

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                    admin_token: Some(SecretString::from(ADMIN_TOKEN)),
                },
                storage: StorageConfig::Memory,
                relay: RelayConfig::default(),
                channels: Vec::new(),
                telemetry: None,
            },
        }
    }

    /// Add an OpenAI-style channel serving `mock-model`, pointed at a mock backend
    ///
    /// Channels added earlier get a higher priority, so they are tried first.
    pub fn with_channel(self, id: u32, base_url: &str) -> Self {
        self.with_channel_config(id, base_url, |_| {})
    }

    /// Add a channel and adjust its definition
    pub fn with_channel_config(mut self, id: u32, base_url: &str, edit: impl FnOnce(&mut ChannelConfig)) -> Self {
        let priority = 100 - i64::try_from(self.config.channels.len()).unwrap_or(0);
        let mut channel = ChannelConfig {
            id,
            name: format!("channel-{id}"),
            kind: ChannelKind::Openai,
            base_url: Some(base_url.parse().expect("valid URL")),
            api_key: Some(SecretString::from("test-key")),
            groups: vec!["default".to_owned()],
            models: vec!["mock-model".to_owned()],
            priority,
            weight: 1,
            auto_ban: true,
            quota_limit: None,
            count_limit: None,
            rpm_limit: None,
            auto_reset: None,
            status: InitialStatus::Enabled,
        };
        edit(&mut channel);

        self.config.channels.push(channel);
        self
    }

    /// Adjust the relay section
    pub fn with_relay(mut self, edit: impl FnOnce(&mut RelayConfig)) -> Self {
        edit(&mut self.config.relay);
        self
    }

    /// Remove the admin token, which unmounts the admin routes
    pub fn without_admin(mut self) -> Self {
        self.config.server.admin_token = None;
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}
