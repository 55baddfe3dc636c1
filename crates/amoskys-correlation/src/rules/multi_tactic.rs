//! Rule 4 (§4.4): outbound flow, a process running from a suspicious
//! path, and a persistence write — three different tactics — all within
//! 900 seconds of each other is read as a single coordinated attack
//! rather than three unrelated findings.

use amoskys_envelope::TelemetryBody;

use super::{IncidentDraft, Rule};
use crate::event_view::EventView;

const WINDOW_NS: u64 = 900 * 1_000_000_000;

const SUSPICIOUS_PROCESS_PREFIXES: &[&str] = &["/tmp/", "/private/tmp/", "/var/tmp/", "/dev/shm/"];

fn is_suspicious_process_path(executable: &str) -> bool {
    SUSPICIOUS_PROCESS_PREFIXES.iter().any(|p| executable.starts_with(p))
}

fn within_window(a: u64, b: u64) -> bool {
    a.abs_diff(b) <= WINDOW_NS
}

pub struct MultiTacticRule;

impl Rule for MultiTacticRule {
    fn id(&self) -> &'static str {
        "multi_tactic_attack"
    }

    fn evaluate(&self, events: &[EventView], device_id: &str) -> Option<IncidentDraft> {
        let flows: Vec<&EventView> = events
            .iter()
            .filter(|e| matches!(&e.body, TelemetryBody::Flow(f) if f.direction == amoskys_envelope::Direction::Outbound))
            .collect();
        let suspicious_procs: Vec<&EventView> = events
            .iter()
            .filter(|e| matches!(&e.body, TelemetryBody::Process(p) if is_suspicious_process_path(&p.executable)))
            .collect();
        let persistence_writes: Vec<&EventView> = events
            .iter()
            .filter(|e| matches!(&e.body, TelemetryBody::Audit(a) if a.persistence_class.is_some()))
            .collect();

        for flow in &flows {
            for proc in &suspicious_procs {
                if !within_window(flow.event_ts_ns, proc.event_ts_ns) {
                    continue;
                }
                for persist in &persistence_writes {
                    if within_window(flow.event_ts_ns, persist.event_ts_ns)
                        && within_window(proc.event_ts_ns, persist.event_ts_ns)
                    {
                        let start_ts_ns = [flow.event_ts_ns, proc.event_ts_ns, persist.event_ts_ns]
                            .into_iter()
                            .min()
                            .expect("three elements");
                        return Some(
                            IncidentDraft::new(
                                self.id(),
                                amoskys_envelope::Severity::Critical,
                                format!("{device_id}: outbound flow, suspicious process, and persistence write co-occurred"),
                                start_ts_ns,
                            )
                            .with_techniques(["T1071", "T1036", "T1547"]),
                        );
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_envelope::{AuditAction, AuditEvent, Direction, EventType, FlowEvent, ProcessEvent, Severity};

    fn flow_event(ts_ns: u64) -> EventView {
        EventView {
            event_id: format!("f-{ts_ns}"),
            event_type: EventType::Flow,
            severity: Severity::Info,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Flow(FlowEvent {
                src_addr: "10.0.0.5".into(),
                src_port: 4444,
                dst_addr: "203.0.113.9".into(),
                dst_port: 443,
                protocol: "tcp".into(),
                direction: Direction::Outbound,
                bytes_in: 10,
                bytes_out: 20,
                packet_count: 2,
                start_ts_ns: ts_ns,
                end_ts_ns: ts_ns + 1,
            }),
        }
    }

    fn proc_event(ts_ns: u64) -> EventView {
        EventView {
            event_id: format!("p-{ts_ns}"),
            event_type: EventType::Process,
            severity: Severity::Warn,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Process(ProcessEvent {
                pid: 100,
                ppid: 1,
                executable: "/tmp/payload".into(),
                cmdline: "/tmp/payload --run".into(),
                parent_is_shell: true,
                user: Some("root".into()),
            }),
        }
    }

    fn audit_event(ts_ns: u64) -> EventView {
        EventView {
            event_id: format!("a-{ts_ns}"),
            event_type: EventType::Audit,
            severity: Severity::Warn,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Audit(AuditEvent {
                action: AuditAction::Created,
                path: "/etc/cron.d/evil".into(),
                persistence_class: Some("cron-persistence".into()),
            }),
        }
    }

    #[test]
    fn fires_when_all_three_co_occur() {
        let events = vec![flow_event(10), proc_event(20), audit_event(30)];
        let draft = MultiTacticRule.evaluate(&events, "dev-1").unwrap();
        assert_eq!(draft.severity, Severity::Critical);
    }

    #[test]
    fn does_not_fire_with_only_two_tactics() {
        let events = vec![flow_event(10), proc_event(20)];
        assert!(MultiTacticRule.evaluate(&events, "dev-1").is_none());
    }
}
