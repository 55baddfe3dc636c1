//! The envelope itself (§3.1): the unit that crosses the wire from an
//! agent to the bus.

use amoskys_core::error::{codes, CoreError};
use amoskys_core::ids::IdempotencyKey;
use serde::{Deserialize, Serialize};

use crate::flow::FlowEvent;
use crate::telemetry::{DeviceTelemetry, ProcessEvent};

/// Protocol version tag. Only `"v1"` exists today; the type is kept
/// distinct from a bare `String` so a future `"v2"` can be added as a
/// variant without touching every call site that matches on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    V1,
}

impl ProtocolVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V1 => "v1",
        }
    }
}

/// Exactly one of these is present on any given [`Envelope`] (§3.1
/// invariant: "exactly one payload variant present"). `Legacy` is the
/// forward-compatibility fallback: a producer that predates a payload
/// type this version doesn't know about yet can still ship raw bytes,
/// which the bus re-parses into one of the structured variants at
/// admission time rather than rejecting outright.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Payload {
    FlowEvent(FlowEvent),
    DeviceTelemetry(DeviceTelemetry),
    ProcessEvent(ProcessEvent),
    /// Opaque bytes from a producer using an unrecognized payload shape.
    /// The bus attempts to decode this as one of the structured variants
    /// before giving up (§4.1 step 4).
    Legacy(Vec<u8>),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Envelope {
    pub version: ProtocolVersion,
    pub ts_ns: u64,
    idempotency_key: String,
    pub source_identity: String,
    pub payload: Payload,
    /// Reserved: Ed25519 signature over the canonical serialization.
    /// Carried on the wire but not yet verified against the trust map
    /// (§4.1 authorization model, §9 open question).
    pub signature: Option<Vec<u8>>,
}

impl Envelope {
    pub fn new(
        ts_ns: u64,
        idempotency_key: impl Into<String>,
        source_identity: impl Into<String>,
        payload: Payload,
    ) -> Result<Self, CoreError> {
        let envelope = Self {
            version: ProtocolVersion::V1,
            ts_ns,
            idempotency_key: idempotency_key.into(),
            source_identity: source_identity.into(),
            payload,
            signature: None,
        };
        envelope.validate()?;
        Ok(envelope)
    }

    pub fn with_signature(mut self, signature: Vec<u8>) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Validated accessor: returns the parsed, length-checked idempotency
    /// key rather than the raw wire string.
    pub fn idempotency_key(&self) -> Result<IdempotencyKey, CoreError> {
        IdempotencyKey::parse(self.idempotency_key.clone())
    }

    /// Raw wire value, for contexts (dedupe cache keys, WAL rows) that
    /// just need a cheap borrow and have already validated the envelope.
    pub fn idempotency_key_str(&self) -> &str {
        &self.idempotency_key
    }

    /// The §3.1 structural invariants that don't require knowing the
    /// serialized byte size (that check happens in [`crate::codec`]
    /// against `MAX_ENV_BYTES`, since it needs the encoded length).
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.ts_ns == 0 {
            return Err(CoreError::new(
                codes::BUS_PAYLOAD_INVALID,
                "ts_ns must be > 0",
            ));
        }
        // Enforces non-empty and the 128-byte cap in one place.
        IdempotencyKey::parse(self.idempotency_key.clone())?;
        Ok(())
    }
}
