//! The AMOSKYS wire schema (§3) and its codec.
//!
//! Wire format is `bincode` over a fixed struct field order, which gives
//! the "canonical serialization MUST be deterministic" requirement (§4.3)
//! for free — `bincode` has no map/field reordering to worry about, unlike
//! JSON. Forward compatibility with future producers is handled by the
//! [`Payload::Legacy`] fallback variant plus a `version` tag that is
//! checked, not parsed structurally.

pub mod codec;
pub mod envelope;
pub mod file_state;
pub mod flow;
pub mod indicator;
pub mod telemetry;

pub use codec::EnvelopeCodec;
pub use envelope::{Envelope, Payload, ProtocolVersion};
pub use file_state::{ChangeType, FileChange, FileState};
pub use flow::{Direction, FlowEvent};
pub use indicator::{AttackPhase, ThreatIndicator};
pub use telemetry::{
    AuditAction, AuditEvent, DeviceTelemetry, DeviceType, EventType, ProcessEvent,
    SecurityEvent, SecurityEventKind, Severity, TelemetryBody, TelemetryEvent,
};
