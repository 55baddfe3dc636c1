//! Peripheral (USB) attach collector (§4.5 composition). Stubbed to a
//! polling stat of `/sys/bus/usb/devices` — a portable approximation of
//! the udev attach-event stream that doesn't require a netlink socket or
//! root, at the cost of only ever observing state at the collector's
//! own cadence rather than the moment of attach.

use std::collections::HashSet;
use std::fs;
use std::sync::{Arc, Mutex};

use amoskys_core::time::Clock;
use amoskys_envelope::{EventType, SecurityEvent, SecurityEventKind, Severity, TelemetryBody, TelemetryEvent};

const USB_DEVICES_PATH: &str = "/sys/bus/usb/devices";

pub struct PeripheralCollector {
    devices_path: String,
    known: Mutex<HashSet<String>>,
    clock: Arc<dyn Clock>,
}

impl PeripheralCollector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_devices_path(USB_DEVICES_PATH.to_string(), clock)
    }

    pub fn with_devices_path(devices_path: String, clock: Arc<dyn Clock>) -> Self {
        Self {
            devices_path,
            known: Mutex::new(HashSet::new()),
            clock,
        }
    }

    /// Diffs the current device listing against what was seen last
    /// cycle and emits one event per newly appeared entry. A missing
    /// sysfs path (no USB subsystem, or running off-Linux) yields no
    /// events rather than an error.
    pub fn collect(&self) -> Vec<TelemetryEvent> {
        let entries = match fs::read_dir(&self.devices_path) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let current: HashSet<String> = entries
            .flatten()
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect();

        let mut known = self.known.lock().expect("peripheral known-set mutex poisoned");
        let new_devices: Vec<String> = current.difference(&known).cloned().collect();
        *known = current;
        drop(known);

        let ts_ns = self.clock.now_ns();
        new_devices
            .into_iter()
            .map(|device| TelemetryEvent {
                event_id: format!("usb-{device}-{ts_ns}"),
                event_type: EventType::Security,
                severity: Severity::Info,
                event_ts_ns: ts_ns,
                body: TelemetryBody::Security(
                    SecurityEvent::new(SecurityEventKind::Generic)
                        .with_command(format!("usb device attached: {device}")),
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_core::time::MockClock;

    #[test]
    fn missing_sysfs_path_yields_nothing() {
        let collector = PeripheralCollector::with_devices_path("/nonexistent/path".into(), Arc::new(MockClock::default()));
        assert!(collector.collect().is_empty());
    }

    #[test]
    fn first_scan_reports_every_device_then_settles() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("1-1")).unwrap();
        fs::create_dir(dir.path().join("1-2")).unwrap();

        let collector = PeripheralCollector::with_devices_path(
            dir.path().to_string_lossy().into_owned(),
            Arc::new(MockClock::default()),
        );
        let first = collector.collect();
        assert_eq!(first.len(), 2);

        let second = collector.collect();
        assert!(second.is_empty());
    }

    #[test]
    fn a_newly_attached_device_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("1-1")).unwrap();

        let collector = PeripheralCollector::with_devices_path(
            dir.path().to_string_lossy().into_owned(),
            Arc::new(MockClock::default()),
        );
        collector.collect();

        fs::create_dir(dir.path().join("1-2")).unwrap();
        let events = collector.collect();
        assert_eq!(events.len(), 1);
    }
}
