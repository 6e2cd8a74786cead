//! Configuration for the switchboard gateway
//!
//! Everything is read from a single TOML file. Relay tunables that operators
//! change at runtime are additionally exposed through [`SettingsHandle`].

#![allow(clippy::must_use_candidate)]

pub mod channel;
mod env;
pub mod health;
mod loader;
pub mod relay;
pub mod server;
pub mod settings;
pub mod storage;
pub mod telemetry;

use serde::Deserialize;

pub use channel::*;
pub use health::*;
pub use relay::*;
pub use server::*;
pub use settings::*;
pub use storage::*;
pub use telemetry::TelemetryConfig;

/// Top-level switchboard configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Where mutable channel state is persisted
    #[serde(default)]
    pub storage: StorageConfig,
    /// Retry, disable and sweep behaviour
    #[serde(default)]
    pub relay: RelayConfig,
    /// Upstream channels
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    /// Telemetry configuration
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
}
