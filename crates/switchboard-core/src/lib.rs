//! Shared primitives for the switchboard crates

#![allow(clippy::must_use_candidate)]

mod context;
mod error;

pub use context::RequestIdentity;
pub use error::HttpError;
