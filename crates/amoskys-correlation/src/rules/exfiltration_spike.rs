//! Rule 6 (§4.4): 10 MiB or more of outbound traffic to a single
//! destination inside 300 seconds. Agent-side `amoskys-detect` already
//! flags a spike against a device's own rolling baseline; this rule is
//! the coarser, baseline-free backstop that runs centrally.

use amoskys_envelope::{Direction, Severity, TelemetryBody};

use super::{IncidentDraft, Rule};
use crate::event_view::EventView;

const WINDOW_NS: u64 = 300 * 1_000_000_000;
const THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

pub struct ExfiltrationSpikeRule;

impl Rule for ExfiltrationSpikeRule {
    fn id(&self) -> &'static str {
        "exfiltration_spike"
    }

    fn evaluate(&self, events: &[EventView], device_id: &str) -> Option<IncidentDraft> {
        let flows: Vec<&EventView> = events
            .iter()
            .filter(|e| matches!(&e.body, TelemetryBody::Flow(f) if f.direction == Direction::Outbound))
            .collect();

        for (i, window_start) in flows.iter().enumerate() {
            let TelemetryBody::Flow(start_flow) = &window_start.body else { unreachable!() };
            let mut total: u64 = 0;
            for candidate in &flows[i..] {
                if candidate.event_ts_ns - window_start.event_ts_ns > WINDOW_NS {
                    break;
                }
                let TelemetryBody::Flow(flow) = &candidate.body else { continue };
                if flow.dst_addr == start_flow.dst_addr {
                    total = total.saturating_add(flow.total_bytes());
                }
            }
            if total >= THRESHOLD_BYTES {
                return Some(
                    IncidentDraft::new(
                        self.id(),
                        Severity::Critical,
                        format!("{device_id}: {total} bytes sent to {} within 300s", start_flow.dst_addr),
                        window_start.event_ts_ns,
                    )
                    .with_techniques(["T1041"]),
                );
            }
        }
        None
    }
}
