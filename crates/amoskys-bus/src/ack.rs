//! The acknowledgement a bus sends back for every admitted-or-rejected
//! envelope (§4.1, §6.1). The status is a single tagged byte on the
//! wire; it travels alongside a `reason` string and, for a `Retry`, a
//! `backoff_hint_ms` a shipper should honor before trying the same
//! envelope again.

use amoskys_core::error::{CoreError, ErrorCategory};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Ack {
    Ok = 0,
    Retry = 1,
    Invalid = 2,
    Unauthorized = 3,
    Error = 4,
}

impl Ack {
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Ack::Ok),
            1 => Some(Ack::Retry),
            2 => Some(Ack::Invalid),
            3 => Some(Ack::Unauthorized),
            4 => Some(Ack::Error),
            _ => None,
        }
    }

    /// The disposition an agent's shipper should apply: only `Retry`
    /// means "try again" (§7 error taxonomy; every other outcome is
    /// final for this particular envelope).
    pub fn should_retry(self) -> bool {
        matches!(self, Ack::Retry)
    }
}

impl From<&CoreError> for Ack {
    fn from(err: &CoreError) -> Self {
        match err.category() {
            ErrorCategory::Transient => Ack::Retry,
            ErrorCategory::Permanent => Ack::Invalid,
            ErrorCategory::Security => Ack::Unauthorized,
            ErrorCategory::Internal => Ack::Error,
        }
    }
}

/// The full acknowledgement message the bus writes back on the wire
/// (§4.1, §6.1: `Ack{status, reason, backoff_hint_ms?}`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PublishAck {
    pub status: Ack,
    pub reason: String,
    pub backoff_hint_ms: Option<u64>,
}

impl PublishAck {
    pub fn ok() -> Self {
        Self { status: Ack::Ok, reason: String::new(), backoff_hint_ms: None }
    }

    pub fn retry(reason: impl Into<String>, backoff_hint_ms: u64) -> Self {
        Self { status: Ack::Retry, reason: reason.into(), backoff_hint_ms: Some(backoff_hint_ms) }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self { status: Ack::Invalid, reason: reason.into(), backoff_hint_ms: None }
    }

    pub fn should_retry(&self) -> bool {
        self.status.should_retry()
    }

    /// Maps a rejection from the admission pipeline to an acknowledgement,
    /// carrying the error's message through as `reason`. `Retry` outcomes
    /// reached this way (rather than via [`PublishAck::retry`]) get no
    /// backoff hint — a caller producing a `Retry` with a hint to give
    /// should build it with [`PublishAck::retry`] instead.
    pub fn from_core_error(err: &CoreError) -> Self {
        Self { status: Ack::from(err), reason: err.to_string(), backoff_hint_ms: None }
    }
}
