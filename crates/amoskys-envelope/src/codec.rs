//! Wire codec for [`Envelope`] (§3.1, §4.3 determinism requirement).
//!
//! `bincode` is used with its default (little-endian, fixed field order,
//! varint-free) configuration, so two processes encoding the same
//! `Envelope` value always produce the same bytes — the property the
//! dedupe cache and WAL checksum both rely on.

use amoskys_core::error::{codes, CoreError};

use crate::envelope::Envelope;

/// Largest encoded envelope the bus will accept (§4.1 step 2, §6.4
/// `BUS_MAX_ENV_BYTES`). The codec itself just exposes the check; the
/// configured limit lives in `amoskys_core::config::BusConfig`.
pub const DEFAULT_MAX_ENV_BYTES: usize = 131_072;

#[derive(Clone, Copy, Debug, Default)]
pub struct EnvelopeCodec;

impl EnvelopeCodec {
    pub fn new() -> Self {
        Self
    }

    pub fn encode(&self, envelope: &Envelope) -> Result<Vec<u8>, CoreError> {
        bincode::serialize(envelope)
            .map_err(|e| CoreError::new(codes::CODEC_ENCODE_FAILED, "envelope encode failed").with_cause(e))
    }

    /// Decodes without a size check — callers that already know the byte
    /// slice came from a size-gated source (e.g. a framed transport that
    /// enforces its own limit) can skip straight to this.
    pub fn decode(&self, bytes: &[u8]) -> Result<Envelope, CoreError> {
        bincode::deserialize(bytes)
            .map_err(|e| CoreError::new(codes::CODEC_DECODE_FAILED, "envelope decode failed").with_cause(e))
    }

    /// Decodes enforcing `max_bytes`, the admission-pipeline size gate
    /// (§4.1 step 2). Rejects before touching the deserializer so an
    /// oversized frame can't even partially allocate.
    pub fn decode_bounded(&self, bytes: &[u8], max_bytes: usize) -> Result<Envelope, CoreError> {
        if bytes.len() > max_bytes {
            return Err(CoreError::new(
                codes::BUS_SIZE_EXCEEDED,
                format!("Envelope too large ({} > {} bytes)", bytes.len(), max_bytes),
            ));
        }
        self.decode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Payload;
    use crate::flow::{Direction, FlowEvent};

    fn sample_envelope() -> Envelope {
        let flow = FlowEvent {
            src_addr: "10.0.0.1".into(),
            src_port: 4444,
            dst_addr: "10.0.0.9".into(),
            dst_port: 22,
            protocol: "tcp".into(),
            direction: Direction::Outbound,
            bytes_in: 10,
            bytes_out: 20,
            packet_count: 1,
            start_ts_ns: 1,
            end_ts_ns: 2,
        };
        Envelope::new(42, "idem-1", "agent-7", Payload::FlowEvent(flow)).unwrap()
    }

    #[test]
    fn round_trips() {
        let codec = EnvelopeCodec::new();
        let encoded = codec.encode(&sample_envelope()).unwrap();
        let decoded = codec.decode(&encoded).unwrap();
        assert_eq!(decoded.idempotency_key_str(), "idem-1");
        assert_eq!(decoded.ts_ns, 42);
    }

    #[test]
    fn encoding_is_deterministic() {
        let codec = EnvelopeCodec::new();
        let a = codec.encode(&sample_envelope()).unwrap();
        let b = codec.encode(&sample_envelope()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_oversized_frame() {
        let codec = EnvelopeCodec::new();
        let encoded = codec.encode(&sample_envelope()).unwrap();
        let err = codec.decode_bounded(&encoded, 4);
        assert!(err.is_err());
    }
}
