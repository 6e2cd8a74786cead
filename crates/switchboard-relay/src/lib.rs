//! Failover relay: pick a channel, dispatch, classify, retry
//!
//! [`Relay`] runs the same retry loop for every wire protocol. A
//! [`RelayProtocol`] plugs in the dispatch call and the protocol's error
//! dialect; [`classify`] decides whether a failure moves on to another
//! channel, and whether it costs the channel its place in rotation.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod classify;
mod errlog;
mod error;
mod keywords;
mod metrics;
mod orchestrator;
pub mod protocol;
mod status_queue;

pub use classify::{Classification, ClassifyContext};
pub use errlog::{ErrorLog, ErrorRecord, TracingErrorLog, format_trail};
pub use error::{ClassifiedError, EMPTY_RESPONSE, ErrorKind, SATURATED_MESSAGE, TerminalError, UpstreamError};
pub use keywords::KeywordMatcher;
pub use orchestrator::{ChannelBinding, Relay, RelayRequest, RelayServices, Relayed, RetryRecord};
pub use protocol::{ProtocolKind, RelayProtocol};
pub use status_queue::StatusQueue;
