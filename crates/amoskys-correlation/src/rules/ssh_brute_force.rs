//! Rule 1 (§4.4): three or more SSH auth failures from the same source
//! followed by a success within 1,800 seconds reads as a brute-forced
//! compromise, not a user who mistyped a password twice.

use amoskys_envelope::{SecurityEventKind, Severity, TelemetryBody};

use super::{IncidentDraft, Rule};
use crate::event_view::EventView;

const WINDOW_NS: u64 = 1_800 * 1_000_000_000;
const MIN_FAILURES: usize = 3;

pub struct SshBruteForceRule;

impl Rule for SshBruteForceRule {
    fn id(&self) -> &'static str {
        "ssh_brute_force"
    }

    fn evaluate(&self, events: &[EventView], device_id: &str) -> Option<IncidentDraft> {
        for event in events {
            let TelemetryBody::Security(sec) = &event.body else { continue };
            if sec.kind != SecurityEventKind::SshAuthSuccess {
                continue;
            }
            let success_remote = sec.remote_addr.as_deref()?;

            let failures: Vec<&EventView> = events
                .iter()
                .filter(|e| e.event_ts_ns < event.event_ts_ns)
                .filter(|e| matches!(&e.body, TelemetryBody::Security(s)
                    if s.kind == SecurityEventKind::SshAuthFailure
                        && s.remote_addr.as_deref() == Some(success_remote)))
                .collect();

            if failures.len() < MIN_FAILURES {
                continue;
            }
            let first_failure_ts = failures[0].event_ts_ns;
            if event.event_ts_ns - first_failure_ts > WINDOW_NS {
                continue;
            }

            return Some(
                IncidentDraft::new(
                    self.id(),
                    Severity::Error,
                    format!("{device_id}: {} failed SSH logins from {success_remote} preceded a successful login", failures.len()),
                    first_failure_ts,
                )
                .with_techniques(["T1110", "T1021.004"]),
            );
        }
        None
    }
}
