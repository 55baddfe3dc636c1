//! Wires the per-device window manager to the rule registry and the
//! incident store (§4.4). A rule panicking is caught and logged; the
//! engine never lets one bad rule block ingest or take its siblings
//! down with it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use amoskys_core::error::CoreError;
use amoskys_core::time::Clock;
use amoskys_store::Store;
use tracing::{error, warn};

use crate::event_view::EventView;
use crate::incident_id;
use crate::rules::{default_rules, Rule};
use crate::window::WindowManager;

pub struct CorrelationEngine {
    windows: WindowManager,
    rules: Vec<Box<dyn Rule>>,
    store: Arc<Store>,
    clock: Arc<dyn Clock>,
}

impl CorrelationEngine {
    pub fn new(window: Duration, store: Arc<Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: WindowManager::new(window, Arc::clone(&clock)),
            rules: default_rules(),
            store,
            clock,
        }
    }

    /// Records one event into its device's window. Call this from the
    /// WAL-append fan-out or the periodic telemetry-store scan (§4.4
    /// input sources); it does not by itself evaluate any rule.
    pub fn ingest(&self, event: EventView) {
        self.windows.ingest(event);
    }

    /// Evaluates every rule against one device's current window,
    /// persisting any incidents produced. Returns the number of
    /// incidents emitted (already deduplicated by the store's
    /// `incident_id` primary key — a rule re-firing on the same
    /// evidence is a no-op here, not a second row).
    pub async fn evaluate_device(&self, device_id: &str) -> Result<usize, CoreError> {
        let events = self.windows.snapshot(device_id);
        let mut emitted = 0;

        for rule in &self.rules {
            let rule_id = rule.id();
            let draft = match catch_unwind(AssertUnwindSafe(|| rule.evaluate(&events, device_id))) {
                Ok(draft) => draft,
                Err(_) => {
                    error!(rule_id, device_id, "correlation rule panicked, skipping");
                    continue;
                }
            };

            let Some(draft) = draft else { continue };
            let incident_id = incident_id::derive(draft.rule_id, device_id, draft.start_ts_ns);

            let result = self
                .store
                .incidents()
                .create(
                    &incident_id,
                    draft.rule_id,
                    device_id,
                    draft.severity,
                    &draft.summary,
                    &draft.mitre_techniques,
                    "[]",
                    self.clock.now_ns(),
                )
                .await;

            match result {
                Ok(()) => emitted += 1,
                Err(err) if is_duplicate_incident(&err) => {
                    // Already emitted for this exact evidence; not an error.
                }
                Err(err) => {
                    warn!(rule_id, device_id, error = %err, "failed to persist incident");
                }
            }
        }

        Ok(emitted)
    }

    /// Evaluates every device with a live window. Intended to be driven
    /// by a tumbling-cadence timer (§4.4, default every 30s) when the
    /// in-process fan-out from WAL appends isn't wired up.
    pub async fn evaluate_all(&self) -> Result<usize, CoreError> {
        let mut total = 0;
        for device_id in self.windows.device_ids() {
            total += self.evaluate_device(&device_id).await?;
        }
        Ok(total)
    }
}

fn is_duplicate_incident(err: &CoreError) -> bool {
    err.cause()
        .map(|cause| cause.to_string().to_lowercase().contains("unique"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_core::time::MockClock;
    use amoskys_envelope::{EventType, SecurityEvent, SecurityEventKind, Severity, TelemetryBody};

    async fn temp_engine() -> (CorrelationEngine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = Arc::new(Store::open(path.to_str().unwrap()).await.unwrap());
        let clock = Arc::new(MockClock::default());
        let engine = CorrelationEngine::new(Duration::from_secs(1800), store, clock);
        (engine, dir)
    }

    fn auth_event(ts_ns: u64, kind: SecurityEventKind, remote: &str) -> EventView {
        EventView {
            event_id: format!("e-{ts_ns}"),
            event_type: EventType::Security,
            severity: Severity::Warn,
            event_ts_ns: ts_ns,
            device_id: "dev-1".into(),
            body: TelemetryBody::Security(SecurityEvent::new(kind).with_remote_addr(remote)),
        }
    }

    #[tokio::test]
    async fn brute_force_evidence_emits_one_incident() {
        let (engine, _dir) = temp_engine().await;
        for ts in [1, 2, 3, 4] {
            let kind = if ts == 4 { SecurityEventKind::SshAuthSuccess } else { SecurityEventKind::SshAuthFailure };
            engine.ingest(auth_event(ts, kind, "10.0.0.9"));
        }

        let emitted = engine.evaluate_device("dev-1").await.unwrap();
        assert_eq!(emitted, 1);

        let open = engine.store.incidents().list_open("dev-1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].rule_id, "ssh_brute_force");
    }

    #[tokio::test]
    async fn re_evaluating_identical_evidence_does_not_duplicate() {
        let (engine, _dir) = temp_engine().await;
        for ts in [1, 2, 3, 4] {
            let kind = if ts == 4 { SecurityEventKind::SshAuthSuccess } else { SecurityEventKind::SshAuthFailure };
            engine.ingest(auth_event(ts, kind, "10.0.0.9"));
        }

        engine.evaluate_device("dev-1").await.unwrap();
        engine.evaluate_device("dev-1").await.unwrap();

        let open = engine.store.incidents().list_open("dev-1").await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn quiet_device_emits_nothing() {
        let (engine, _dir) = temp_engine().await;
        let emitted = engine.evaluate_device("dev-unknown").await.unwrap();
        assert_eq!(emitted, 0);
    }
}
