//! Rule 7 (§4.4): a process spawned by an interactive shell out of a
//! world-writable temp or downloads directory — the shape of a
//! downloaded-and-executed payload rather than anything a package
//! manager or init system would ever launch.

use amoskys_detect::suspicious_path;
use amoskys_envelope::{Direction, Severity, TelemetryBody};

use super::{IncidentDraft, Rule};
use crate::event_view::EventView;

const ESCALATION_WINDOW_NS: u64 = 60 * 1_000_000_000;

pub struct SuspiciousProcessTreeRule;

impl Rule for SuspiciousProcessTreeRule {
    fn id(&self) -> &'static str {
        "suspicious_process_tree"
    }

    fn evaluate(&self, events: &[EventView], device_id: &str) -> Option<IncidentDraft> {
        for event in events {
            let TelemetryBody::Process(proc) = &event.body else { continue };
            if !proc.parent_is_shell || !suspicious_path::is_suspicious(&proc.executable) {
                continue;
            }

            let accompanied_by_flow = events.iter().any(|e| {
                e.event_ts_ns.abs_diff(event.event_ts_ns) <= ESCALATION_WINDOW_NS
                    && matches!(&e.body, TelemetryBody::Flow(f) if f.direction == Direction::Outbound)
            });

            let severity = if accompanied_by_flow { Severity::Critical } else { Severity::Error };
            return Some(
                IncidentDraft::new(
                    self.id(),
                    severity,
                    format!("{device_id}: shell-spawned process {} running from a suspicious path", proc.executable),
                    event.event_ts_ns,
                )
                .with_techniques(["T1059.004"]),
            );
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_envelope::{EventType, FlowEvent, ProcessEvent};

    fn proc_event(ts_ns: u64, executable: &str, parent_is_shell: bool) -> EventView {
        EventView {
            event_id: format!("p-{ts_ns}"),
            event_type: EventType::Process,
            severity: Severity::Warn,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Process(ProcessEvent {
                pid: 1000,
                ppid: 500,
                executable: executable.to_string(),
                cmdline: executable.to_string(),
                parent_is_shell,
                user: None,
            }),
        }
    }

    fn outbound_flow(ts_ns: u64) -> EventView {
        EventView {
            event_id: format!("f-{ts_ns}"),
            event_type: EventType::Flow,
            severity: Severity::Info,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Flow(FlowEvent {
                src_addr: "10.0.0.5".into(),
                src_port: 1234,
                dst_addr: "203.0.113.9".into(),
                dst_port: 443,
                protocol: "tcp".into(),
                direction: Direction::Outbound,
                bytes_in: 0,
                bytes_out: 10,
                packet_count: 1,
                start_ts_ns: ts_ns,
                end_ts_ns: ts_ns + 1,
            }),
        }
    }

    #[test]
    fn fires_for_shell_spawned_tmp_binary() {
        let events = vec![proc_event(10, "/tmp/payload", true)];
        let draft = SuspiciousProcessTreeRule.evaluate(&events, "dev-1").unwrap();
        assert_eq!(draft.severity, Severity::Error);
    }

    #[test]
    fn escalates_when_accompanied_by_outbound_flow() {
        let events = vec![proc_event(10, "/tmp/payload", true), outbound_flow(20)];
        let draft = SuspiciousProcessTreeRule.evaluate(&events, "dev-1").unwrap();
        assert_eq!(draft.severity, Severity::Critical);
    }

    #[test]
    fn ignores_non_shell_parent() {
        let events = vec![proc_event(10, "/tmp/payload", false)];
        assert!(SuspiciousProcessTreeRule.evaluate(&events, "dev-1").is_none());
    }
}
