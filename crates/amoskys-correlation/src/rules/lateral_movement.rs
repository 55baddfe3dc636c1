//! Rule 5 (§4.4): an inbound SSH success followed by this host opening
//! its own outbound SSH connection to a *different* remote within 300
//! seconds — the shape of a host being used as a stepping stone rather
//! than an endpoint.

use amoskys_envelope::{Direction, SecurityEventKind, Severity, TelemetryBody};

use super::{IncidentDraft, Rule};
use crate::event_view::EventView;

const WINDOW_NS: u64 = 300 * 1_000_000_000;
const SSH_PORT: u16 = 22;

pub struct SshLateralMovementRule;

impl Rule for SshLateralMovementRule {
    fn id(&self) -> &'static str {
        "ssh_lateral_movement"
    }

    fn evaluate(&self, events: &[EventView], device_id: &str) -> Option<IncidentDraft> {
        for login in events {
            let TelemetryBody::Security(sec) = &login.body else { continue };
            if sec.kind != SecurityEventKind::SshAuthSuccess {
                continue;
            }
            let inbound_remote = sec.remote_addr.as_deref();

            let next_hop = events.iter().find(|e| {
                e.event_ts_ns > login.event_ts_ns
                    && e.event_ts_ns - login.event_ts_ns <= WINDOW_NS
                    && matches!(&e.body, TelemetryBody::Flow(f)
                        if f.direction == Direction::Outbound
                            && f.dst_port == SSH_PORT
                            && Some(f.dst_addr.as_str()) != inbound_remote)
            });

            if let Some(hop) = next_hop {
                let TelemetryBody::Flow(flow) = &hop.body else { unreachable!() };
                return Some(
                    IncidentDraft::new(
                        self.id(),
                        Severity::Error,
                        format!("{device_id}: inbound SSH login followed by outbound SSH to {}", flow.dst_addr),
                        login.event_ts_ns,
                    )
                    .with_techniques(["T1021.004"]),
                );
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_envelope::{EventType, FlowEvent, SecurityEvent};

    fn login(ts_ns: u64, remote: &str) -> EventView {
        EventView {
            event_id: format!("l-{ts_ns}"),
            event_type: EventType::Security,
            severity: Severity::Warn,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Security(SecurityEvent::new(SecurityEventKind::SshAuthSuccess).with_remote_addr(remote)),
        }
    }

    fn outbound_ssh(ts_ns: u64, dst: &str) -> EventView {
        EventView {
            event_id: format!("f-{ts_ns}"),
            event_type: EventType::Flow,
            severity: Severity::Info,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Flow(FlowEvent {
                src_addr: "10.0.0.5".into(),
                src_port: 51000,
                dst_addr: dst.to_string(),
                dst_port: 22,
                protocol: "tcp".into(),
                direction: Direction::Outbound,
                bytes_in: 1,
                bytes_out: 1,
                packet_count: 1,
                start_ts_ns: ts_ns,
                end_ts_ns: ts_ns + 1,
            }),
        }
    }

    #[test]
    fn fires_for_hop_to_different_remote() {
        let events = vec![login(10, "198.51.100.1"), outbound_ssh(20, "198.51.100.2")];
        assert!(SshLateralMovementRule.evaluate(&events, "dev-1").is_some());
    }

    #[test]
    fn does_not_fire_for_reply_to_same_remote() {
        let events = vec![login(10, "198.51.100.1"), outbound_ssh(20, "198.51.100.1")];
        assert!(SshLateralMovementRule.evaluate(&events, "dev-1").is_none());
    }
}
