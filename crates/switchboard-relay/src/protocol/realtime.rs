use async_trait::async_trait;
use serde_json::{Value, json};
use switchboard_channel::ChannelSlot;

use super::{ProtocolKind, RelayProtocol};
use crate::error::{TerminalError, UpstreamError};

/// Failure while opening the upstream half of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RealtimeFailure {
    pub status: u16,
    pub error_type: String,
    pub message: String,
    pub local: bool,
}

/// Opens the upstream side of a bidirectional session
///
/// The relay only decides where the session goes. Pumping frames between
/// the two halves is the caller's job once a connection is returned.
#[async_trait]
pub trait RealtimeAdapter: Send + Sync {
    /// Client session handle the upstream is opened for
    type Session: Send + Sync;
    /// Connected upstream half
    type Connection: Send;

    async fn connect(&self, session: &Self::Session, channel: &ChannelSlot) -> Result<Self::Connection, RealtimeFailure>;
}

#[derive(Debug, Clone)]
pub struct RealtimeProtocol<A> {
    adapter: A,
}

impl<A: RealtimeAdapter> RealtimeProtocol<A> {
    pub const fn new(adapter: A) -> Self {
        Self { adapter }
    }
}

#[async_trait]
impl<A: RealtimeAdapter> RelayProtocol for RealtimeProtocol<A> {
    type Request = A::Session;
    type Success = A::Connection;
    type Failure = RealtimeFailure;

    fn kind(&self) -> ProtocolKind {
        ProtocolKind::Realtime
    }

    async fn dispatch(&self, session: &A::Session, channel: &ChannelSlot) -> Result<A::Connection, RealtimeFailure> {
        self.adapter.connect(session, channel).await
    }

    fn normalize(&self, failure: RealtimeFailure) -> UpstreamError {
        UpstreamError {
            status: failure.status,
            error_type: Some(failure.error_type).filter(|t| !t.is_empty()),
            code: None,
            message: failure.message,
            local: failure.local,
        }
    }

    // Session usage is charged by whoever pumps the frames
    fn quota_of(&self, _success: &A::Connection) -> i64 {
        0
    }

    fn render_error(&self, error: &TerminalError) -> Value {
        json!({
            "type": "error",
            "event_id": format!("event_{}", error.request_id),
            "error": {
                "type": error.error_type,
                "code": error.code,
                "message": error.message,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::{Arc, Mutex};

    use http::StatusCode;
    use switchboard_channel::store::MemoryStore;
    use switchboard_channel::{
        AutoReset, ChannelDefinition, ChannelHealth, ChannelId, ChannelRegistry, ChannelStatus, ChannelStore,
        LogNotifier, UsageLedger,
    };
    use switchboard_config::{ChannelKind, RelaySettings, SettingsHandle};
    use switchboard_core::RequestIdentity;
    use switchboard_ratelimit::{LimitSetting, QuotaGate};

    use super::*;
    use crate::{ErrorKind, Relay, RelayRequest, RelayServices, RetryRecord, StatusQueue, TracingErrorLog};

    #[derive(Debug)]
    struct NoAdapter;

    #[async_trait]
    impl RealtimeAdapter for NoAdapter {
        type Session = ();
        type Connection = ();

        async fn connect(&self, _: &(), _: &ChannelSlot) -> Result<(), RealtimeFailure> {
            Ok(())
        }
    }

    #[test]
    fn terminal_error_becomes_error_event() {
        let protocol = RealtimeProtocol::new(NoAdapter);
        let error = TerminalError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            kind: ErrorKind::ServerError,
            error_type: "server_error".to_owned(),
            code: None,
            message: "down (request id: req-9)".to_owned(),
            request_id: "req-9".to_owned(),
            trail: Vec::new(),
            retries: Vec::new(),
        };

        let event = protocol.render_error(&error);

        assert_eq!(event["type"], "error");
        assert_eq!(event["event_id"], "event_req-9");
        assert_eq!(event["error"]["message"], "down (request id: req-9)");
    }

    /// Refuses sessions on the listed channels, connects everywhere else
    #[derive(Debug, Default)]
    struct HandshakeAdapter {
        refusing: Vec<u32>,
        attempts: Mutex<Vec<ChannelId>>,
    }

    #[async_trait]
    impl RealtimeAdapter for HandshakeAdapter {
        type Session = u64;
        type Connection = (ChannelId, u64);

        async fn connect(&self, session: &u64, channel: &ChannelSlot) -> Result<(ChannelId, u64), RealtimeFailure> {
            self.attempts.lock().unwrap().push(channel.id());

            if self.refusing.contains(&channel.id().get()) {
                return Err(RealtimeFailure {
                    status: 503,
                    error_type: "server_error".to_owned(),
                    message: "socket handshake refused".to_owned(),
                    local: false,
                });
            }

            Ok((channel.id(), *session))
        }
    }

    fn definition(id: u32) -> ChannelDefinition {
        ChannelDefinition {
            id: ChannelId::new(id),
            name: format!("realtime-{id}"),
            kind: ChannelKind::Openai,
            base_url: None,
            api_key: None,
            groups: BTreeSet::from(["default".to_owned()]),
            models: BTreeSet::from(["gpt-4o-realtime".to_owned()]),
            priority: 10 - i64::from(id),
            weight: 1,
            auto_ban: true,
            limits: QuotaGate::default(),
            rpm_limit: LimitSetting::disabled(),
            auto_reset: AutoReset::default(),
            initial_status: ChannelStatus::Enabled,
        }
    }

    #[tokio::test]
    async fn session_fails_over_to_the_next_channel() {
        let registry = Arc::new(ChannelRegistry::from_definitions(vec![definition(1), definition(2)]).unwrap());
        let store: Arc<dyn ChannelStore> = Arc::new(MemoryStore::default());
        registry.hydrate(store.as_ref()).await.unwrap();

        let settings = SettingsHandle::new(RelaySettings {
            immediate_disable_codes: BTreeSet::new(),
            ..RelaySettings::default()
        });
        let health = ChannelHealth::new(Arc::clone(&registry), Arc::clone(&store), Arc::new(LogNotifier));
        let services = RelayServices {
            ledger: UsageLedger::spawn(Arc::clone(&registry), store, settings.clone()),
            statuses: StatusQueue::spawn(health.clone(), settings.clone()),
            health,
            settings,
            error_log: Arc::new(TracingErrorLog),
        };

        let adapter = HandshakeAdapter {
            refusing: vec![1],
            ..HandshakeAdapter::default()
        };
        let relay = Relay::new(RealtimeProtocol::new(adapter), services);
        let request = RelayRequest::new(RequestIdentity::with_request_id("req-rt"), "default", "gpt-4o-realtime");

        let relayed = relay.run(&request, &7).await.unwrap();

        assert_eq!(relayed.payload, (ChannelId::new(2), 7));
        assert_eq!(relayed.trail, vec![ChannelId::new(1), ChannelId::new(2)]);
        assert_eq!(
            relayed.retries,
            vec![RetryRecord {
                channel: ChannelId::new(1),
                reason: "service_unavailable".to_owned(),
            }]
        );
        assert_eq!(
            *relay.protocol().adapter.attempts.lock().unwrap(),
            vec![ChannelId::new(1), ChannelId::new(2)]
        );
        let slot = registry.get(ChannelId::new(2)).unwrap();
        assert_eq!((slot.used_quota(), slot.used_count()), (0, 1));
    }
}
