//! File-integrity-monitoring collector (§4.5 FIM diff algorithm, §6.3
//! baseline persistence). Walks each configured root, hashes every
//! regular file found, diffs against the last baseline, and emits one
//! `AUDIT` event per detected change.

use std::collections::{BTreeMap, BTreeSet};
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use amoskys_core::time::Clock;
use amoskys_detect::{fim, persistence};
use amoskys_envelope::{
    AuditAction, AuditEvent, ChangeType, EventType, FileChange, FileState, TelemetryBody, TelemetryEvent,
};
use tracing::warn;

use crate::baseline::Baseline;

const WORLD_WRITABLE_BIT: u32 = 0o002;
const SUID_BIT: u32 = 0o4000;
const SGID_BIT: u32 = 0o2000;

pub struct FimCollector {
    roots: Vec<PathBuf>,
    baseline_path: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FimCollector {
    pub fn new(roots: Vec<String>, baseline_path: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self {
            roots: roots.into_iter().map(PathBuf::from).collect(),
            baseline_path,
            clock,
        }
    }

    /// Replaces the on-disk baseline with a fresh scan, emitting no
    /// events (`--baseline-only`, §6.5).
    pub fn write_baseline_only(&self) -> Result<(), CoreError> {
        Baseline { files: self.scan() }.save(&self.baseline_path)
    }

    /// Scans, diffs against the stored baseline, persists the new
    /// baseline, and returns one `TelemetryEvent` per detected change.
    pub fn collect(&self) -> Result<Vec<TelemetryEvent>, CoreError> {
        let baseline = Baseline::load(&self.baseline_path)?;
        let current = self.scan();
        let ts_ns = self.clock.now_ns();

        let mut events = Vec::new();
        let mut seen = BTreeSet::new();

        for (path, new_state) in &current {
            seen.insert(path.clone());
            let old_state = baseline.files.get(path).cloned();
            if let Some(change) = fim::diff(old_state, Some(new_state.clone())) {
                events.push(change_to_event(change, ts_ns));
            }
        }
        for (path, old_state) in &baseline.files {
            if !seen.contains(path) {
                if let Some(change) = fim::diff(Some(old_state.clone()), None) {
                    events.push(change_to_event(change, ts_ns));
                }
            }
        }

        Baseline { files: current }.save(&self.baseline_path)?;
        Ok(events)
    }

    /// Walks every root, hashing each regular file found. Errors reading
    /// an individual directory or file are logged and that entry is
    /// skipped rather than aborting the whole scan — a locked or
    /// vanished file shouldn't blind the rest of the tree.
    fn scan(&self) -> BTreeMap<String, FileState> {
        let mut out = BTreeMap::new();
        for root in &self.roots {
            walk(root, &mut out);
        }
        out
    }
}

fn walk(dir: &Path, out: &mut BTreeMap<String, FileState>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %dir.display(), error = %err, "failed to read fim directory, skipping");
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            walk(&path, out);
        } else if file_type.is_file() {
            match file_state(&path) {
                Ok(state) => {
                    out.insert(state.path.clone(), state);
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to hash file during fim scan, skipping");
                }
            }
        }
    }
}

fn file_state(path: &Path) -> Result<FileState, CoreError> {
    let file = std::fs::File::open(path).map_err(|e| {
        CoreError::new(codes::AGENT_COLLECTOR_FAILED, "failed to open file for fim hashing").with_cause(e)
    })?;
    let metadata = file
        .metadata()
        .map_err(|e| CoreError::new(codes::AGENT_COLLECTOR_FAILED, "failed to stat file during fim scan").with_cause(e))?;
    let sha256 = fim::hash_stream(&file)
        .map_err(|e| CoreError::new(codes::AGENT_COLLECTOR_FAILED, "failed to hash file during fim scan").with_cause(e))?;

    let mode = metadata.permissions().mode();
    Ok(FileState {
        path: path.to_string_lossy().into_owned(),
        sha256,
        size: metadata.len(),
        mode,
        uid: metadata.uid(),
        gid: metadata.gid(),
        mtime_ns: metadata.mtime() as u64 * 1_000_000_000 + metadata.mtime_nsec() as u64,
        is_suid: mode & SUID_BIT != 0,
        is_sgid: mode & SGID_BIT != 0,
        is_world_writable: mode & WORLD_WRITABLE_BIT != 0,
        xattrs: Vec::new(),
    })
}

fn change_to_event(change: FileChange, event_ts_ns: u64) -> TelemetryEvent {
    let action = match change.change_type {
        ChangeType::Created => AuditAction::Created,
        ChangeType::Deleted => AuditAction::Deleted,
        ChangeType::Modified => AuditAction::Modified,
        ChangeType::PermissionChanged => AuditAction::PermissionChanged,
        ChangeType::OwnerChanged => AuditAction::OwnerChanged,
    };
    let persistence_class = persistence::match_path(&change.path).map(|m| m.class.to_string());

    TelemetryEvent {
        event_id: format!("fim-{}-{}", change.path, event_ts_ns),
        event_type: EventType::Audit,
        severity: change.severity,
        event_ts_ns,
        body: TelemetryBody::Audit(AuditEvent {
            action,
            path: change.path,
            persistence_class,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_core::time::MockClock;
    use std::fs;

    #[test]
    fn first_scan_reports_every_file_as_created() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let baseline_path = dir.path().join("baseline.json");

        let collector = FimCollector::new(
            vec![dir.path().to_string_lossy().into_owned()],
            baseline_path,
            Arc::new(MockClock::default()),
        );
        let events = collector.collect().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].body {
            TelemetryBody::Audit(audit) => assert_eq!(audit.action, AuditAction::Created),
            other => panic!("expected an audit event, got {other:?}"),
        }
    }

    #[test]
    fn unchanged_tree_produces_no_events_on_second_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let baseline_path = dir.path().join("baseline.json");

        let collector = FimCollector::new(
            vec![dir.path().to_string_lossy().into_owned()],
            baseline_path,
            Arc::new(MockClock::default()),
        );
        collector.collect().unwrap();
        let second = collector.collect().unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn deleting_a_baselined_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("a.txt");
        fs::write(&file_path, b"hello").unwrap();
        let baseline_path = dir.path().join("baseline.json");

        let collector = FimCollector::new(
            vec![dir.path().to_string_lossy().into_owned()],
            baseline_path,
            Arc::new(MockClock::default()),
        );
        collector.collect().unwrap();
        fs::remove_file(&file_path).unwrap();
        let events = collector.collect().unwrap();

        assert_eq!(events.len(), 1);
        match &events[0].body {
            TelemetryBody::Audit(audit) => assert_eq!(audit.action, AuditAction::Deleted),
            other => panic!("expected an audit event, got {other:?}"),
        }
    }

    #[test]
    fn baseline_only_writes_baseline_without_events() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let baseline_path = dir.path().join("baseline.json");

        let collector = FimCollector::new(
            vec![dir.path().to_string_lossy().into_owned()],
            baseline_path.clone(),
            Arc::new(MockClock::default()),
        );
        collector.write_baseline_only().unwrap();
        assert!(baseline_path.exists());
        assert!(collector.collect().unwrap().is_empty());
    }
}
