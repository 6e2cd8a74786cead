use serde::Deserialize;
use url::Url;

/// Backend holding the mutable part of each channel record
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Process-local storage (single instance, state lost on restart)
    #[default]
    Memory,
    /// Redis-backed storage shared between gateway instances
    Redis(RedisStorageConfig),
}

/// Redis connection settings for channel state
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisStorageConfig {
    /// Redis connection URL
    pub url: Url,
    /// Prefix for every key written by the gateway
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    "switchboard".to_owned()
}
