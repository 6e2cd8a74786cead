use std::net::SocketAddr;

use secrecy::SecretString;
use serde::Deserialize;

use crate::health::HealthConfig;

/// HTTP surface configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind, defaults to `0.0.0.0:3000`
    pub listen_address: Option<SocketAddr>,
    #[serde(default)]
    pub health: HealthConfig,
    /// Bearer token guarding the channel admin routes and channel pinning
    ///
    /// The admin routes are not mounted when this is absent
    #[serde(default)]
    pub admin_token: Option<SecretString>,
}
