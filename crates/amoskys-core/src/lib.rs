//! Shared contracts for the AMOSKYS telemetry platform.
//!
//! This crate carries nothing domain-specific (no envelopes, no rules); it
//! is the seam every other crate in the workspace builds against so that
//! error handling, ids, time, and observability stay uniform across the
//! agent, the bus, and the correlation engine.

pub mod config;
pub mod error;
pub mod ids;
pub mod observability;
pub mod retry;
mod sealed;
pub mod time;

pub use error::{CoreError, ErrorCategory, Result};
pub use sealed::Sealed;
