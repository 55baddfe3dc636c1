//! Per-device bounded time windows (§4.4): a `DashMap` keyed by device,
//! each entry holding the last `W` minutes of that device's events. The
//! sharded, entry-based access pattern follows the concurrent session
//! registry used elsewhere in the corpus for per-key mutable state.

use std::sync::Arc;
use std::time::Duration;

use amoskys_core::time::Clock;
use dashmap::DashMap;

use crate::event_view::EventView;

pub struct WindowManager {
    windows: DashMap<String, Vec<EventView>>,
    window: Duration,
    clock: Arc<dyn Clock>,
}

impl WindowManager {
    pub fn new(window: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: DashMap::new(),
            window,
            clock,
        }
    }

    /// Records one event and evicts anything now older than the window.
    pub fn ingest(&self, event: EventView) {
        let mut entry = self.windows.entry(event.device_id.clone()).or_default();
        entry.push(event);
        self.evict_expired(&mut entry);
    }

    /// Returns a timestamp-ascending snapshot of `device_id`'s current
    /// window, for a rule to evaluate against (§4.4 tie-break rule:
    /// "events are sorted by event_ts_ns ascending before rule
    /// evaluation").
    pub fn snapshot(&self, device_id: &str) -> Vec<EventView> {
        let mut events = self
            .windows
            .get(device_id)
            .map(|entry| entry.clone())
            .unwrap_or_default();
        events.sort_by_key(|e| e.event_ts_ns);
        events
    }

    pub fn device_ids(&self) -> Vec<String> {
        self.windows.iter().map(|entry| entry.key().clone()).collect()
    }

    fn evict_expired(&self, events: &mut Vec<EventView>) {
        let now_ns = self.clock.now_ns();
        let window_ns = self.window.as_nanos() as u64;
        events.retain(|e| now_ns.saturating_sub(e.event_ts_ns) <= window_ns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_core::time::MockClock;
    use amoskys_envelope::{AuditAction, AuditEvent, EventType, Severity, TelemetryBody};

    fn sample(device_id: &str, ts_ns: u64) -> EventView {
        EventView {
            event_id: format!("e-{ts_ns}"),
            event_type: EventType::Audit,
            severity: Severity::Info,
            event_ts_ns: ts_ns,
            device_id: device_id.to_string(),
            body: TelemetryBody::Audit(AuditEvent {
                action: AuditAction::Created,
                path: "/tmp/x".into(),
                persistence_class: None,
            }),
        }
    }

    #[test]
    fn ingest_is_per_device() {
        let clock = Arc::new(MockClock::default());
        let manager = WindowManager::new(Duration::from_secs(1800), clock.clone());
        manager.ingest(sample("dev-1", clock.now_ns()));
        manager.ingest(sample("dev-2", clock.now_ns()));
        assert_eq!(manager.snapshot("dev-1").len(), 1);
        assert_eq!(manager.snapshot("dev-2").len(), 1);
    }

    #[test]
    fn evicts_events_older_than_window() {
        let clock = Arc::new(MockClock::default());
        let manager = WindowManager::new(Duration::from_secs(60), clock.clone());
        manager.ingest(sample("dev-1", clock.now_ns()));
        clock.advance(Duration::from_secs(120));
        manager.ingest(sample("dev-1", clock.now_ns()));
        assert_eq!(manager.snapshot("dev-1").len(), 1);
    }

    #[test]
    fn snapshot_is_timestamp_ordered() {
        let clock = Arc::new(MockClock::default());
        let manager = WindowManager::new(Duration::from_secs(1800), clock.clone());
        let base = clock.now_ns();
        manager.ingest(sample("dev-1", base + 20));
        manager.ingest(sample("dev-1", base + 5));
        manager.ingest(sample("dev-1", base + 10));
        let events: Vec<u64> = manager.snapshot("dev-1").iter().map(|e| e.event_ts_ns).collect();
        assert_eq!(events, vec![base + 5, base + 10, base + 20]);
    }
}
