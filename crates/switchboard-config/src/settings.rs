//! Parsed, runtime-swappable relay settings

use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::relay::RelayConfig;

/// Relay tunables in their parsed form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub retry_times: u32,
    /// Status codes that disable a channel and move on immediately
    pub immediate_disable_codes: BTreeSet<u16>,
    pub empty_response_retry: bool,
    pub automatic_disable: bool,
    pub automatic_enable: bool,
    /// Lower-cased disable keywords
    pub disable_keywords: Vec<String>,
    pub sweep_interval: Duration,
    pub batch_update: bool,
    pub batch_interval: Duration,
    pub error_log: bool,
}

impl RelaySettings {
    /// Parse the raw `[relay]` section
    ///
    /// # Errors
    ///
    /// Returns an error if the status-code list or a duration is malformed,
    /// or if the sweep interval is zero
    pub fn from_config(config: &RelayConfig) -> anyhow::Result<Self> {
        let sweep_interval = parse_duration(&config.sweep_interval)?;
        if sweep_interval.is_zero() {
            anyhow::bail!("relay.sweep_interval must be greater than zero");
        }

        let batch_interval = parse_duration(&config.batch_interval)?;
        if config.batch_update && batch_interval.is_zero() {
            anyhow::bail!("relay.batch_interval must be greater than zero when batch_update is on");
        }

        Ok(Self {
            retry_times: config.retry_times,
            immediate_disable_codes: parse_status_codes(&config.retry_disable_status_codes)?,
            empty_response_retry: config.empty_response_retry,
            automatic_disable: config.automatic_disable,
            automatic_enable: config.automatic_enable,
            disable_keywords: config
                .disable_keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            sweep_interval,
            batch_update: config.batch_update,
            batch_interval,
            error_log: config.error_log,
        })
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default()).unwrap_or_else(|_| Self {
            retry_times: 3,
            immediate_disable_codes: BTreeSet::new(),
            empty_response_retry: false,
            automatic_disable: true,
            automatic_enable: false,
            disable_keywords: Vec::new(),
            sweep_interval: Duration::from_secs(60),
            batch_update: false,
            batch_interval: Duration::from_secs(5),
            error_log: true,
        })
    }
}

/// Shared handle to the current [`RelaySettings`]
///
/// Readers take a cheap snapshot per use; writers swap the whole value
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    current: Arc<RwLock<Arc<RelaySettings>>>,
}

impl SettingsHandle {
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(settings))),
        }
    }

    /// Snapshot of the settings in effect right now
    pub fn current(&self) -> Arc<RelaySettings> {
        Arc::clone(&self.current.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Replace the settings wholesale
    pub fn replace(&self, settings: RelaySettings) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(settings);
    }

    /// Apply an in-place edit to a copy of the current settings and publish it
    pub fn update(&self, edit: impl FnOnce(&mut RelaySettings)) {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        let mut next = RelaySettings::clone(&guard);
        edit(&mut next);
        *guard = Arc::new(next);
    }
}

impl Default for SettingsHandle {
    fn default() -> Self {
        Self::new(RelaySettings::default())
    }
}

/// Parse an operator-supplied comma list such as `"401, 403,500"`
///
/// # Errors
///
/// Returns an error when an entry is not a valid HTTP status code
pub fn parse_status_codes(raw: &str) -> anyhow::Result<BTreeSet<u16>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<u16>() {
            Ok(code) if (100..=599).contains(&code) => Ok(code),
            _ => Err(anyhow::anyhow!("invalid status code in retry_disable_status_codes: `{s}`")),
        })
        .collect()
}

/// Parse a human duration such as `"90s"` or `"1h"`
///
/// # Errors
///
/// Returns an error when the string is not understood by `duration-str`
pub fn parse_duration(raw: &str) -> anyhow::Result<Duration> {
    duration_str::parse(raw).map_err(|e| anyhow::anyhow!("invalid duration '{raw}': {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_disable_codes() {
        let settings = RelaySettings::default();
        assert_eq!(
            settings.immediate_disable_codes.iter().copied().collect::<Vec<_>>(),
            vec![401, 403, 429, 500, 502, 503]
        );
        assert_eq!(settings.retry_times, 3);
        assert_eq!(settings.sweep_interval, Duration::from_secs(60));
    }

    #[test]
    fn status_codes_tolerate_whitespace_and_empty_entries() {
        let codes = parse_status_codes(" 401 ,, 500").unwrap();
        assert!(codes.contains(&401));
        assert!(codes.contains(&500));
        assert_eq!(codes.len(), 2);
    }

    #[test]
    fn empty_status_code_list_is_allowed() {
        assert!(parse_status_codes("").unwrap().is_empty());
    }

    #[test]
    fn garbage_status_code_is_rejected() {
        assert!(parse_status_codes("401,abc").is_err());
        assert!(parse_status_codes("42").is_err());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let config = RelayConfig {
            sweep_interval: "0s".to_owned(),
            ..RelayConfig::default()
        };
        assert!(RelaySettings::from_config(&config).is_err());
    }

    #[test]
    fn keywords_are_lowercased() {
        let config = RelayConfig {
            disable_keywords: vec!["Quota Exceeded".to_owned(), "  ".to_owned()],
            ..RelayConfig::default()
        };
        let settings = RelaySettings::from_config(&config).unwrap();
        assert_eq!(settings.disable_keywords, vec!["quota exceeded".to_owned()]);
    }

    #[test]
    fn handle_update_is_visible_to_clones() {
        let handle = SettingsHandle::default();
        let other = handle.clone();
        let before = handle.current();

        other.update(|s| s.retry_times = 7);

        assert_eq!(handle.current().retry_times, 7);
        assert_eq!(before.retry_times, 3);
    }
}
