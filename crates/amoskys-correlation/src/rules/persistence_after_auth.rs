//! Rule 2 (§4.4): a successful SSH or sudo authentication followed
//! within 600 seconds by a write to a persistence-class path is the
//! classic shape of "get in, then make sure you can get back in."

use amoskys_envelope::{SecurityEventKind, Severity, TelemetryBody};

use super::{IncidentDraft, Rule};
use crate::event_view::EventView;

const WINDOW_NS: u64 = 600 * 1_000_000_000;

fn technique_for_class(class: &str) -> &'static str {
    match class {
        "cron-persistence" => "T1053.003",
        "systemd-unit-persistence" | "sysv-init-persistence" => "T1543.002",
        "ld-preload-hijack" => "T1574.006",
        "ssh-authorized-keys" => "T1098.004",
        "sudoers-tamper" => "T1548.003",
        _ => "T1098",
    }
}

fn is_user_home(path: &str) -> bool {
    path.starts_with("/home/") || path.starts_with("/Users/")
}

pub struct PersistenceAfterAuthRule;

impl Rule for PersistenceAfterAuthRule {
    fn id(&self) -> &'static str {
        "persistence_after_auth"
    }

    fn evaluate(&self, events: &[EventView], device_id: &str) -> Option<IncidentDraft> {
        for auth in events {
            let TelemetryBody::Security(sec) = &auth.body else { continue };
            if !matches!(sec.kind, SecurityEventKind::SshAuthSuccess | SecurityEventKind::SudoExec) {
                continue;
            }

            let hit = events.iter().find(|e| {
                e.event_ts_ns > auth.event_ts_ns
                    && e.event_ts_ns - auth.event_ts_ns <= WINDOW_NS
                    && matches!(&e.body, TelemetryBody::Audit(a)
                        if a.persistence_class.is_some() && a.action == amoskys_envelope::AuditAction::Created)
            });

            if let Some(hit) = hit {
                let TelemetryBody::Audit(audit) = &hit.body else { unreachable!() };
                let class = audit.persistence_class.as_deref().unwrap_or("unknown");
                let severity = if is_user_home(&audit.path) { Severity::Critical } else { Severity::Error };
                return Some(
                    IncidentDraft::new(
                        self.id(),
                        severity,
                        format!("{device_id}: persistence write to {} followed an authenticated session", audit.path),
                        auth.event_ts_ns,
                    )
                    .with_techniques([technique_for_class(class)]),
                );
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_envelope::{AuditAction, AuditEvent, EventType, SecurityEvent};

    fn success(ts_ns: u64) -> EventView {
        EventView {
            event_id: format!("s-{ts_ns}"),
            event_type: EventType::Security,
            severity: Severity::Warn,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Security(SecurityEvent::new(SecurityEventKind::SshAuthSuccess)),
        }
    }

    fn persistence_write(ts_ns: u64, path: &str) -> EventView {
        EventView {
            event_id: format!("a-{ts_ns}"),
            event_type: EventType::Audit,
            severity: Severity::Info,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Audit(AuditEvent {
                action: AuditAction::Created,
                path: path.to_string(),
                persistence_class: Some("cron-persistence".into()),
            }),
        }
    }

    #[test]
    fn fires_for_persistence_write_after_login() {
        let events = vec![success(10), persistence_write(20, "/etc/cron.d/x")];
        let draft = PersistenceAfterAuthRule.evaluate(&events, "dev-1").unwrap();
        assert_eq!(draft.severity, Severity::Error);
    }

    #[test]
    fn escalates_to_critical_under_user_home() {
        let events = vec![success(10), persistence_write(20, "/home/alice/.ssh/authorized_keys")];
        let draft = PersistenceAfterAuthRule.evaluate(&events, "dev-1").unwrap();
        assert_eq!(draft.severity, Severity::Critical);
    }

    #[test]
    fn ignores_writes_outside_the_window() {
        let events = vec![success(0), persistence_write(700_000_000_000, "/etc/cron.d/x")];
        assert!(PersistenceAfterAuthRule.evaluate(&events, "dev-1").is_none());
    }
}
