//! The structured error domain shared by every crate in the workspace.
//!
//! # Why
//! The bus, the agent, and the correlation engine each originate failures
//! at different layers (TLS handshakes, disk I/O, malformed wire bytes,
//! rule panics) that all eventually have to collapse into one of a small
//! number of dispositions: retry, reject, refuse, or log-and-continue.
//! Rather than pattern-matching strings at each call site, every error
//! that crosses a crate boundary is converted into a [`CoreError`] carrying
//! a stable code and an [`ErrorCategory`]. The category is what admission
//! handling in `amoskys-bus` and backoff handling in `amoskys-agent`
//! actually branch on.
//!
//! # How
//! [`CoreError::category`] prefers an explicitly set category, and falls
//! back to a static lookup table ([`codes`]/[`category_matrix`]) keyed by
//! the stable code. Call sites that know their own disposition (a decode
//! failure is always [`ErrorCategory::Permanent`]) don't need to set it
//! explicitly; call sites that discover the disposition only at runtime
//! (a WAL write that may or may not be retryable) call
//! [`CoreError::with_category`].

pub mod category_matrix;

use std::borrow::Cow;
use std::fmt;

/// Result alias used throughout the workspace.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// The disposition a [`CoreError`] drives at the admission/shipping
/// boundary. Mirrors the taxonomy in the design notes: transient errors
/// are retried with backoff, permanent errors are rejected once and never
/// retried, security errors stop shipping and surface a fatal alert, and
/// internal errors are retried but logged with full detail (never leaked
/// to the peer).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// I/O timeouts, lock contention, downstream back-pressure. → RETRY.
    Transient,
    /// Size violation, malformed payload, schema mismatch. → INVALID.
    Permanent,
    /// Unknown peer CN, bad or missing signature. → UNAUTHORIZED.
    Security,
    /// Unexpected internal fault. → RETRY + full log, no detail to client.
    Internal,
}

/// A boxed cause, type-erased so that [`CoreError`] doesn't have to be
/// generic over the error types of every crate that produces one.
pub type ErrorCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type every public fallible API in the workspace returns (or
/// converts into at its boundary).
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
    cause: Option<ErrorCause>,
    category: Option<ErrorCategory>,
}

impl CoreError {
    /// Construct a new error from a stable code and a human message.
    ///
    /// `code` should follow the `<domain>.<reason>` convention used by
    /// [`codes`] (e.g. `"bus.overloaded"`); custom codes are allowed but
    /// won't resolve a default category unless one is set explicitly.
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
            category: None,
        }
    }

    /// Attach a boxed cause, consuming and returning `self`.
    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Explicitly override the category this error resolves to, overriding
    /// whatever [`category_matrix`] would otherwise infer from `code`.
    pub fn with_category(mut self, category: ErrorCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// Resolve this error's disposition: an explicit category set via
    /// [`with_category`](Self::with_category) wins; otherwise the code is
    /// looked up in [`category_matrix`]; otherwise it defaults to
    /// [`ErrorCategory::Internal`] so unrecognized failures fail safe into
    /// a retry rather than being silently dropped.
    pub fn category(&self) -> ErrorCategory {
        self.category
            .or_else(|| category_matrix::lookup_default_category(self.code))
            .unwrap_or(ErrorCategory::Internal)
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for CoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Stable error codes, grouped by the crate that originates them. These
/// are the values [`category_matrix::lookup_default_category`] matches
/// against; keep this list and the matrix in sync.
pub mod codes {
    pub const BUS_OVERLOADED: &str = "bus.overloaded";
    pub const BUS_SIZE_EXCEEDED: &str = "bus.size_exceeded";
    pub const BUS_INFLIGHT_EXCEEDED: &str = "bus.inflight_exceeded";
    pub const BUS_PAYLOAD_INVALID: &str = "bus.payload_invalid";
    pub const BUS_UNAUTHORIZED: &str = "bus.unauthorized";
    pub const BUS_WAL_WRITE_FAILED: &str = "bus.wal_write_failed";
    pub const BUS_DEADLINE_EXCEEDED: &str = "bus.deadline_exceeded";
    pub const BUS_INTERNAL: &str = "bus.internal";

    pub const QUEUE_FSYNC_FAILED: &str = "queue.fsync_failed";
    pub const QUEUE_RETRY_EXCEEDED: &str = "queue.retry_exceeded";
    pub const QUEUE_CORRUPT_ENTRY: &str = "queue.corrupt_entry";
    pub const QUEUE_SCHEMA: &str = "queue.schema";

    pub const TRANSPORT_TLS_HANDSHAKE_FAILED: &str = "transport.tls_handshake_failed";
    pub const TRANSPORT_PEER_UNKNOWN: &str = "transport.peer_unknown";
    pub const TRANSPORT_IO: &str = "transport.io";
    pub const TRANSPORT_FRAME_TOO_LARGE: &str = "transport.frame_too_large";

    pub const CODEC_DECODE_FAILED: &str = "codec.decode_failed";
    pub const CODEC_ENCODE_FAILED: &str = "codec.encode_failed";

    pub const STORE_WRITE_FAILED: &str = "store.write_failed";
    pub const STORE_READ_FAILED: &str = "store.read_failed";
    pub const STORE_SCHEMA: &str = "store.schema";

    pub const CORRELATION_RULE_FAILED: &str = "correlation.rule_failed";

    pub const AGENT_COLLECTOR_FAILED: &str = "agent.collector_failed";
}
