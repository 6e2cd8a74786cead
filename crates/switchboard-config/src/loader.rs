use std::collections::HashSet;
use std::path::Path;

use crate::{Config, RelaySettings, settings::parse_duration};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded =
            crate::env::expand_env(&raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        tracing::debug!(
            channels = config.channels.len(),
            path = %path.display(),
            "configuration loaded"
        );

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no channel is configured, channel ids collide,
    /// a channel is unusable as declared, or the relay section is malformed
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_channels()?;
        RelaySettings::from_config(&self.relay)?;
        Ok(())
    }

    fn validate_channels(&self) -> anyhow::Result<()> {
        if self.channels.is_empty() {
            anyhow::bail!("at least one channel must be configured");
        }

        let mut seen = HashSet::new();

        for channel in &self.channels {
            if !seen.insert(channel.id) {
                anyhow::bail!("duplicate channel id {}", channel.id);
            }

            if channel.groups.iter().all(|g| g.trim().is_empty()) {
                anyhow::bail!("channel {} ('{}') serves no group", channel.id, channel.name);
            }

            if channel.models.iter().all(|m| m.trim().is_empty()) {
                anyhow::bail!("channel {} ('{}') serves no model", channel.id, channel.name);
            }

            let limits = [
                ("quota_limit", channel.quota_limit),
                ("count_limit", channel.count_limit),
                ("rpm_limit", channel.rpm_limit),
            ];

            for (name, limit) in limits {
                if limit.is_some_and(|l| l < 0) {
                    anyhow::bail!("channel {}: {name} must not be negative", channel.id);
                }
            }

            if let Some(ref reset) = channel.auto_reset {
                parse_duration(reset).map_err(|e| anyhow::anyhow!("channel {}: auto_reset: {e}", channel.id))?;
            }
        }

        Ok(())
    }
}
