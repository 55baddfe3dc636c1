//! Static code → [`ErrorCategory`](super::ErrorCategory) matrix.
//!
//! Kept as a flat match rather than a `HashMap` built at startup: the
//! table is small, fixed at compile time, and this way `lookup_default_category`
//! has no initialization order to worry about and is trivially `const`-friendly.

use super::{codes, ErrorCategory};

/// Look up the default category for a stable error code. Returns `None`
/// for codes this matrix doesn't know about (custom codes defined outside
/// [`codes`]), in which case [`CoreError::category`](super::CoreError::category)
/// falls back to [`ErrorCategory::Internal`].
pub fn lookup_default_category(code: &str) -> Option<ErrorCategory> {
    use ErrorCategory::*;
    Some(match code {
        codes::BUS_OVERLOADED => Transient,
        codes::BUS_SIZE_EXCEEDED => Permanent,
        codes::BUS_INFLIGHT_EXCEEDED => Transient,
        codes::BUS_PAYLOAD_INVALID => Permanent,
        codes::BUS_UNAUTHORIZED => Security,
        codes::BUS_WAL_WRITE_FAILED => Transient,
        codes::BUS_DEADLINE_EXCEEDED => Transient,
        codes::BUS_INTERNAL => Internal,

        codes::QUEUE_FSYNC_FAILED => Transient,
        codes::QUEUE_RETRY_EXCEEDED => Permanent,
        codes::QUEUE_CORRUPT_ENTRY => Permanent,
        codes::QUEUE_SCHEMA => Internal,

        codes::TRANSPORT_TLS_HANDSHAKE_FAILED => Security,
        codes::TRANSPORT_PEER_UNKNOWN => Security,
        codes::TRANSPORT_IO => Transient,
        codes::TRANSPORT_FRAME_TOO_LARGE => Permanent,

        codes::CODEC_DECODE_FAILED => Permanent,
        codes::CODEC_ENCODE_FAILED => Permanent,

        codes::STORE_WRITE_FAILED => Transient,
        codes::STORE_READ_FAILED => Transient,
        codes::STORE_SCHEMA => Internal,

        codes::CORRELATION_RULE_FAILED => Internal,

        codes::AGENT_COLLECTOR_FAILED => Internal,

        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_registered_code_resolves() {
        for code in [
            codes::BUS_OVERLOADED,
            codes::BUS_SIZE_EXCEEDED,
            codes::BUS_INFLIGHT_EXCEEDED,
            codes::BUS_PAYLOAD_INVALID,
            codes::BUS_UNAUTHORIZED,
            codes::BUS_WAL_WRITE_FAILED,
        ] {
            assert!(lookup_default_category(code).is_some());
        }
    }

    #[test]
    fn unregistered_code_returns_none() {
        assert!(lookup_default_category("nonexistent.code").is_none());
    }
}
