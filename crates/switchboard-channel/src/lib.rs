//! Channel records and everything that mutates them
//!
//! The [`ChannelRegistry`] is the in-process source of truth for selection
//! and status checks. Status changes go through [`ChannelHealth`], usage
//! counters through the [`UsageLedger`], and both are mirrored into a
//! [`ChannelStore`].

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod health;
mod ledger;
mod metrics;
mod model;
mod notify;
mod registry;
mod slot;
pub mod store;
mod sweep;

pub use error::{ChannelError, StoreError};
pub use health::{ChannelHealth, Transition, Trigger};
pub use ledger::UsageLedger;
pub use model::{AutoReset, ChannelDefinition, ChannelId, ChannelSnapshot, ChannelState, ChannelStatus, StatusRecord};
pub use notify::{ChannelEvent, LogNotifier, Notifier, NotifierSet, WebhookNotifier};
pub use registry::ChannelRegistry;
pub use slot::ChannelSlot;
pub use store::ChannelStore;
pub use sweep::{ChannelSweeper, SweepReport};

/// Current unix time in seconds
pub fn unix_now() -> i64 {
    jiff::Timestamp::now().as_second()
}
