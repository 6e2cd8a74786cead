//! Per-channel admission gates
//!
//! Two independent mechanisms decide whether a channel may take traffic:
//! a requests-per-minute bucket enforced right before dispatch, and a
//! quota/count ceiling checked by the periodic sweep.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod error;
mod limit;
mod quota;
mod rpm;

pub use error::RateLimitError;
pub use limit::LimitSetting;
pub use quota::{LimitBreach, QuotaGate};
pub use rpm::{MinuteBucket, RpmGate, minute_of};
