//! Rule 3 (§4.4): a sudo command line matching one of a fixed
//! dangerous-pattern list, independent of anything else in the window.

use amoskys_envelope::{SecurityEventKind, Severity, TelemetryBody};

use super::{IncidentDraft, Rule};
use crate::event_view::EventView;

const DANGEROUS_PATTERNS: &[(&str, Severity)] = &[
    ("rm -rf /", Severity::Critical),
    ("rm -rf --no-preserve-root", Severity::Critical),
    ("visudo", Severity::Error),
    ("/etc/sudoers", Severity::Critical),
    ("kextload", Severity::Error),
    ("chmod 777 /", Severity::Error),
    ("dd if=", Severity::Error),
];

pub struct SuspiciousSudoRule;

impl Rule for SuspiciousSudoRule {
    fn id(&self) -> &'static str {
        "suspicious_sudo"
    }

    fn evaluate(&self, events: &[EventView], device_id: &str) -> Option<IncidentDraft> {
        for event in events {
            let TelemetryBody::Security(sec) = &event.body else { continue };
            if sec.kind != SecurityEventKind::SudoExec {
                continue;
            }
            let Some(command) = &sec.command else { continue };

            if let Some((pattern, severity)) = DANGEROUS_PATTERNS.iter().find(|(p, _)| command.contains(p)) {
                return Some(IncidentDraft::new(
                    self.id(),
                    *severity,
                    format!("{device_id}: sudo command matched dangerous pattern {pattern:?}: {command}"),
                    event.event_ts_ns,
                )
                .with_techniques(["T1548.003"]));
            }
        }
        None
    }
}
