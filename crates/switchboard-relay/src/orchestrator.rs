//! The retry loop shared by every protocol

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use http::StatusCode;
use serde::Serialize;
use switchboard_channel::{
    ChannelHealth, ChannelId, ChannelRegistry, ChannelSlot, ChannelStatus, Trigger, UsageLedger, unix_now,
};
use switchboard_config::{RelaySettings, SettingsHandle};
use switchboard_core::{HttpError, RequestIdentity};
use tokio_util::sync::CancellationToken;

use crate::classify::{ClassifyContext, classify, kind_of, retry_reason};
use crate::errlog::{ErrorLog, ErrorRecord, format_trail};
use crate::error::{ErrorKind, SATURATED_MESSAGE, TerminalError, UpstreamError};
use crate::{RelayProtocol, StatusQueue, metrics};

/// How the channel for a request is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelBinding {
    /// Pick from the registry on every attempt
    #[default]
    Select,
    /// Prefer this channel for the first attempt if it is usable
    FirstHop(ChannelId),
    /// Use only this channel, whatever its status, and never retry
    Pinned(ChannelId),
}

/// One inbound request as seen by the retry loop
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub identity: RequestIdentity,
    pub group: String,
    pub model: String,
    pub binding: ChannelBinding,
    /// Cancelled when the caller goes away
    pub cancel: CancellationToken,
}

impl RelayRequest {
    pub fn new(identity: RequestIdentity, group: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            identity,
            group: group.into(),
            model: model.into(),
            binding: ChannelBinding::Select,
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn with_binding(mut self, binding: ChannelBinding) -> Self {
        self.binding = binding;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// An attempt that was followed by another one
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetryRecord {
    pub channel: ChannelId,
    pub reason: String,
}

/// Successful relay
#[derive(Debug)]
pub struct Relayed<T> {
    pub payload: T,
    /// Channel that produced the payload
    pub channel: ChannelId,
    pub trail: Vec<ChannelId>,
    pub retries: Vec<RetryRecord>,
}

/// Collaborators shared by all relays of a process
#[derive(Debug, Clone)]
pub struct RelayServices {
    pub health: ChannelHealth,
    pub ledger: UsageLedger,
    pub settings: SettingsHandle,
    pub statuses: StatusQueue,
    pub error_log: Arc<dyn ErrorLog>,
}

impl RelayServices {
    pub const fn registry(&self) -> &Arc<ChannelRegistry> {
        self.health.registry()
    }
}

#[derive(Debug)]
struct Trace {
    started: Instant,
    trail: Vec<ChannelId>,
    retries: Vec<RetryRecord>,
    exclude: HashSet<ChannelId>,
    rpm_skipped: bool,
}

impl Trace {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            trail: Vec::new(),
            retries: Vec::new(),
            exclude: HashSet::new(),
            rpm_skipped: false,
        }
    }

    fn retry(&mut self, channel: &ChannelSlot, reason: String) {
        metrics::record_retry(channel, &reason);
        self.retries.push(RetryRecord {
            channel: channel.id(),
            reason,
        });
    }
}

struct Failure {
    channel: Option<Arc<ChannelSlot>>,
    error: UpstreamError,
}

/// Failover relay for one protocol
#[derive(Debug)]
pub struct Relay<P> {
    protocol: P,
    services: RelayServices,
}

impl<P: RelayProtocol> Relay<P> {
    pub const fn new(protocol: P, services: RelayServices) -> Self {
        Self { protocol, services }
    }

    pub const fn protocol(&self) -> &P {
        &self.protocol
    }

    pub const fn services(&self) -> &RelayServices {
        &self.services
    }

    /// Relay `payload` until a channel succeeds or retrying stops
    pub async fn run(&self, request: &RelayRequest, payload: &P::Request) -> Result<Relayed<P::Success>, TerminalError> {
        let settings = self.services.settings.current();
        let pinned = matches!(request.binding, ChannelBinding::Pinned(_));
        let empty_response_aware = settings.empty_response_retry && self.protocol.detects_empty_response();

        let mut trace = Trace::start();
        let mut failure: Option<Failure> = None;

        for attempt in 0..=settings.retry_times {
            if request.cancel.is_cancelled() {
                return Err(self.cancelled(request, trace));
            }

            let channel = match self.pick(request, attempt, &trace.exclude) {
                Ok(Some(channel)) => channel,
                Ok(None) => break,
                Err(error) => {
                    tracing::warn!(
                        request_id = %request.identity.request_id,
                        group = %request.group,
                        model = %request.model,
                        attempt,
                        error = %error.message,
                        "no channel available"
                    );
                    if failure.is_some() || !trace.rpm_skipped {
                        failure = Some(Failure { channel: None, error });
                    }
                    break;
                }
            };
            let id = channel.id();
            trace.exclude.insert(id);

            match channel.rpm().try_acquire(unix_now()) {
                Ok(bucket) => {
                    if channel.rpm().limit().active().is_some() {
                        self.services.ledger.record_bucket(id, bucket);
                    }
                }
                Err(e) => {
                    tracing::info!(request_id = %request.identity.request_id, channel_id = %id, error = %e, "channel at rpm limit, moving on");
                    trace.rpm_skipped = true;
                    if attempt > 0 {
                        trace.retry(&channel, "rpm_limit".to_owned());
                    }
                    continue;
                }
            }

            trace.trail.push(id);
            let error = match self.protocol.dispatch(payload, &channel).await {
                Ok(success) if empty_response_aware && self.protocol.is_empty_response(&success) => {
                    UpstreamError::empty_response()
                }
                Ok(success) => return Ok(self.succeed(request, &settings, &channel, success, trace)),
                Err(native) => self.protocol.normalize(native),
            };

            let ctx = ClassifyContext {
                settings: &settings,
                pinned,
                remaining: settings.retry_times - attempt,
                empty_response_aware,
            };
            let classification = classify(&error, &ctx);
            let reason = retry_reason(&error);

            tracing::warn!(
                request_id = %request.identity.request_id,
                channel_id = %id,
                attempt,
                status = error.status,
                reason = %reason,
                "attempt failed: {}",
                error.message,
            );

            if classification.disable_immediately && channel.definition().auto_ban {
                self.disable_immediately(&channel, &error).await;
                if attempt > 0 {
                    trace.retry(&channel, format!("{reason}_disabled"));
                }
                failure = Some(Failure {
                    channel: Some(channel),
                    error,
                });
                continue;
            }

            if !error.is_empty_response() {
                self.services.statuses.disable_on_failure(id, error.clone());
            }

            let retry = classification.should_retry;
            failure = Some(Failure {
                channel: Some(Arc::clone(&channel)),
                error,
            });

            if !retry {
                break;
            }
            trace.retry(&channel, reason);
        }

        let failure = failure.unwrap_or_else(|| Failure {
            channel: None,
            error: if trace.rpm_skipped {
                UpstreamError::local(429, "rate_limit_exceeded", "every eligible channel is at its rpm limit")
            } else {
                UpstreamError::local(500, "internal_error", "no attempt was made")
            },
        });

        Err(self.fail(request, &settings, failure, trace))
    }

    fn pick(
        &self,
        request: &RelayRequest,
        attempt: u32,
        exclude: &HashSet<ChannelId>,
    ) -> Result<Option<Arc<ChannelSlot>>, UpstreamError> {
        let registry = self.services.registry();

        match request.binding {
            ChannelBinding::Pinned(id) if attempt == 0 => registry.slot(id).map(Some).map_err(|e| local(&e)),
            ChannelBinding::Pinned(_) => Ok(None),
            ChannelBinding::FirstHop(id) if attempt == 0 => match registry.get(id) {
                Some(slot) if slot.status().is_enabled() && slot.definition().serves(&request.group, &request.model) => {
                    Ok(Some(Arc::clone(slot)))
                }
                _ => self.select(request, exclude),
            },
            ChannelBinding::FirstHop(_) | ChannelBinding::Select => self.select(request, exclude),
        }
    }

    fn select(&self, request: &RelayRequest, exclude: &HashSet<ChannelId>) -> Result<Option<Arc<ChannelSlot>>, UpstreamError> {
        self.services
            .registry()
            .select(&request.group, &request.model, exclude)
            .map(Some)
            .map_err(|e| local(&e))
    }

    async fn disable_immediately(&self, channel: &ChannelSlot, error: &UpstreamError) {
        let reason = format!("immediate disable, status code {}: {}", error.status, error.message);

        match self
            .services
            .health
            .disable_auto(channel.id(), reason, Trigger::ImmediateDisable)
            .await
        {
            Ok(transition) if transition.changed() => {
                tracing::warn!(channel_id = %channel.id(), status = error.status, "channel disabled, trying another");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(channel_id = %channel.id(), error = %e, "immediate disable failed"),
        }
    }

    fn succeed(
        &self,
        request: &RelayRequest,
        settings: &RelaySettings,
        channel: &ChannelSlot,
        success: P::Success,
        trace: Trace,
    ) -> Relayed<P::Success> {
        let id = channel.id();
        self.services.ledger.charge(id, self.protocol.quota_of(&success), 1);

        if settings.automatic_enable && channel.status() == ChannelStatus::AutoDisabled {
            self.services.statuses.enable_on_success(id);
        }

        if trace.trail.len() > 1 {
            tracing::info!(
                request_id = %request.identity.request_id,
                trail = %format_trail(&trace.trail),
                "relay succeeded after retries"
            );
        }
        metrics::record_request(self.protocol.kind(), "success", trace.started);

        Relayed {
            payload: success,
            channel: id,
            trail: trace.trail,
            retries: trace.retries,
        }
    }

    fn fail(&self, request: &RelayRequest, settings: &RelaySettings, failure: Failure, trace: Trace) -> TerminalError {
        let Failure { channel, error } = failure;
        let kind = kind_of(&error);

        if trace.trail.len() > 1 {
            tracing::info!(
                request_id = %request.identity.request_id,
                trail = %format_trail(&trace.trail),
                "relay failed after retries"
            );
        }

        let message = if error.status == 429 {
            tracing::warn!(request_id = %request.identity.request_id, "upstream 429: {}", error.message);
            SATURATED_MESSAGE
        } else {
            error.message.as_str()
        };

        let terminal = TerminalError {
            status: terminal_status(&error),
            kind,
            error_type: error.error_type.clone().unwrap_or_else(|| kind.to_string()),
            code: error.code.clone(),
            message: request.identity.tag_message(message),
            request_id: request.identity.request_id.clone(),
            trail: trace.trail,
            retries: trace.retries,
        };

        if settings.error_log && kind != ErrorKind::EmptyResponse {
            self.services.error_log.record(ErrorRecord {
                request_id: request.identity.request_id.clone(),
                user_id: request.identity.user_id.clone(),
                token_name: request.identity.token_name.clone(),
                token_id: request.identity.token_id.clone(),
                group: request.group.clone(),
                model: request.model.clone(),
                channel_id: channel.as_ref().map(|c| c.id()),
                channel_name: channel.as_ref().map(|c| c.name().to_owned()),
                protocol: self.protocol.kind().to_string(),
                status: terminal.status.as_u16(),
                error_type: self.protocol.log_error_type(&terminal),
                error_code: self.protocol.log_error_code(&terminal),
                message: error.message,
                retry_channels: (terminal.trail.len() > 1).then(|| format_trail(&terminal.trail)),
            });
        }

        metrics::record_request(self.protocol.kind(), "failure", trace.started);
        terminal
    }

    fn cancelled(&self, request: &RelayRequest, trace: Trace) -> TerminalError {
        tracing::info!(request_id = %request.identity.request_id, attempts = trace.trail.len(), "caller went away, relay stopped");
        metrics::record_request(self.protocol.kind(), "cancelled", trace.started);

        TerminalError {
            status: StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
            kind: ErrorKind::LocalError,
            error_type: "client_closed_request".to_owned(),
            code: None,
            message: request.identity.tag_message("client closed request"),
            request_id: request.identity.request_id.clone(),
            trail: trace.trail,
            retries: trace.retries,
        }
    }
}

fn local(error: &impl HttpError) -> UpstreamError {
    UpstreamError::local(
        error.status_code().as_u16(),
        error.error_type(),
        error.client_message(),
    )
}

/// Status handed to the caller; an exhausted empty reply is a bad gateway
fn terminal_status(error: &UpstreamError) -> StatusCode {
    if error.is_empty_response() {
        return StatusCode::BAD_GATEWAY;
    }

    StatusCode::from_u16(error.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
