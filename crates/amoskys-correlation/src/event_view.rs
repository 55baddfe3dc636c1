//! The per-device event view the correlation engine actually operates
//! on (§4.4): a flattened projection of a [`TelemetryEvent`] plus the
//! device it came from, cheap to sort and window regardless of which
//! store or fan-out it was sourced from.

use amoskys_envelope::{EventType, Severity, TelemetryBody, TelemetryEvent};

#[derive(Clone, Debug)]
pub struct EventView {
    pub event_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub event_ts_ns: u64,
    pub device_id: String,
    pub body: TelemetryBody,
}

impl EventView {
    pub fn from_telemetry(device_id: impl Into<String>, event: TelemetryEvent) -> Self {
        Self {
            event_id: event.event_id,
            event_type: event.event_type,
            severity: event.severity,
            event_ts_ns: event.event_ts_ns,
            device_id: device_id.into(),
            body: event.body,
        }
    }
}
