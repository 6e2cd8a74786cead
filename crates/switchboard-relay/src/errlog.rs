//! Error-log collaborator: one record per terminal relay failure

use serde::Serialize;
use switchboard_channel::ChannelId;

/// What is written when a relay gives up
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub request_id: String,
    pub user_id: Option<String>,
    pub token_name: Option<String>,
    pub token_id: Option<String>,
    pub group: String,
    pub model: String,
    /// Last channel dispatched to, if any
    pub channel_id: Option<ChannelId>,
    pub channel_name: Option<String>,
    pub protocol: String,
    pub status: u16,
    pub error_type: String,
    pub error_code: Option<String>,
    pub message: String,
    /// `1->2->3`, present when more than one channel was tried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_channels: Option<String>,
}

pub trait ErrorLog: Send + Sync + std::fmt::Debug {
    fn record(&self, record: ErrorRecord);
}

/// Writes error records as structured log events
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorLog;

impl ErrorLog for TracingErrorLog {
    fn record(&self, record: ErrorRecord) {
        tracing::error!(
            request_id = %record.request_id,
            user_id = record.user_id.as_deref(),
            token_name = record.token_name.as_deref(),
            group = %record.group,
            model = %record.model,
            channel_id = record.channel_id.map(ChannelId::get),
            channel_name = record.channel_name.as_deref(),
            protocol = %record.protocol,
            status = record.status,
            error_type = %record.error_type,
            error_code = record.error_code.as_deref(),
            retry_channels = record.retry_channels.as_deref(),
            "relay failed: {}",
            record.message,
        );
    }
}

/// Render a channel trail as `1->2->3`
pub fn format_trail(trail: &[ChannelId]) -> String {
    trail
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("->")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trail_is_joined_with_arrows() {
        let trail = [ChannelId::new(1), ChannelId::new(7), ChannelId::new(3)];
        assert_eq!(format_trail(&trail), "1->7->3");
        assert_eq!(format_trail(&trail[..1]), "1");
    }

    #[test]
    fn retry_channels_are_omitted_when_absent() {
        let record = ErrorRecord {
            request_id: "req-1".to_owned(),
            user_id: None,
            token_name: None,
            token_id: None,
            group: "default".to_owned(),
            model: "gpt-4o".to_owned(),
            channel_id: Some(ChannelId::new(1)),
            channel_name: Some("primary".to_owned()),
            protocol: "completion".to_owned(),
            status: 500,
            error_type: "server_error".to_owned(),
            error_code: None,
            message: "boom".to_owned(),
            retry_channels: None,
        };

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("retry_channels").is_none());
        assert_eq!(json["channel_id"], 1);
    }
}
