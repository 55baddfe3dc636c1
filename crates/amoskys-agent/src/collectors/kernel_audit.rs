//! Kernel audit-log collector (§4.5 composition). Best-effort: tails
//! `auditd`'s log file for new lines since the last read and forwards
//! each as a generic `SECURITY` event. Deployments without a kernel
//! audit subsystem (no audit socket, no `/var/log/audit/audit.log`)
//! simply see this collector produce nothing every cycle rather than
//! fail the agent — the source notes an audit netlink socket would be
//! the precise signal, but that requires `CAP_AUDIT_READ` the agent may
//! not have.

use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use amoskys_core::time::Clock;
use amoskys_envelope::{EventType, SecurityEvent, SecurityEventKind, Severity, TelemetryBody, TelemetryEvent};
use tracing::debug;

const DEFAULT_AUDIT_LOG_PATH: &str = "/var/log/audit/audit.log";

pub struct KernelAuditCollector {
    log_path: PathBuf,
    offset: Mutex<u64>,
    clock: Arc<dyn Clock>,
}

impl KernelAuditCollector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_log_path(PathBuf::from(DEFAULT_AUDIT_LOG_PATH), clock)
    }

    pub fn with_log_path(log_path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            log_path,
            offset: Mutex::new(0),
            clock,
        }
    }

    /// Reads whatever has been appended to the audit log since the last
    /// call and returns one event per new line. Missing log file (no
    /// audit subsystem installed) is silently treated as "nothing new".
    pub fn collect(&self) -> Vec<TelemetryEvent> {
        let mut file = match fs::File::open(&self.log_path) {
            Ok(file) => file,
            Err(_) => {
                debug!(path = %self.log_path.display(), "no kernel audit log present, skipping this cycle");
                return Vec::new();
            }
        };

        let mut offset = self.offset.lock().expect("audit offset mutex poisoned");
        if file.seek(SeekFrom::Start(*offset)).is_err() {
            return Vec::new();
        }

        let mut new_bytes = String::new();
        if file.read_to_string(&mut new_bytes).is_err() {
            return Vec::new();
        }
        *offset += new_bytes.len() as u64;
        drop(offset);

        let ts_ns = self.clock.now_ns();
        new_bytes
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| TelemetryEvent {
                event_id: format!("audit-{ts_ns}-{i}"),
                event_type: EventType::Security,
                severity: Severity::Info,
                event_ts_ns: ts_ns,
                body: TelemetryBody::Security(
                    SecurityEvent::new(SecurityEventKind::Generic).with_command(line.to_string()),
                ),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_core::time::MockClock;
    use std::io::Write;

    #[test]
    fn missing_log_file_yields_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let collector = KernelAuditCollector::with_log_path(dir.path().join("nope.log"), Arc::new(MockClock::default()));
        assert!(collector.collect().is_empty());
    }

    #[test]
    fn only_newly_appended_lines_are_returned() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        fs::write(&path, "type=SYSCALL msg=audit(1): first\n").unwrap();

        let collector = KernelAuditCollector::with_log_path(path.clone(), Arc::new(MockClock::default()));
        let first_batch = collector.collect();
        assert_eq!(first_batch.len(), 1);

        let second_batch = collector.collect();
        assert!(second_batch.is_empty());

        let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "type=SYSCALL msg=audit(2): second").unwrap();

        let third_batch = collector.collect();
        assert_eq!(third_batch.len(), 1);
    }
}
