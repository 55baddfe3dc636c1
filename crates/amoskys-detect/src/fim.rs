//! File-integrity diffing (§4.5, §3.5): turning two successive
//! [`FileState`] snapshots of the same path into a classified
//! [`FileChange`], plus the streaming SHA-256 hash the agent's FIM
//! collector uses to produce those snapshots without holding a whole
//! file in memory.

use std::io::{self, Read};

use amoskys_envelope::{ChangeType, FileChange, FileState, Severity};
use sha2::{Digest, Sha256};

const HASH_CHUNK_BYTES: usize = 64 * 1024;

/// Hashes `reader` to a hex SHA-256 digest, reading in fixed-size chunks
/// so file size is bounded only by time, not memory.
pub fn hash_stream(mut reader: impl Read) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; HASH_CHUNK_BYTES];
    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Diffs two snapshots of the same path. `old`/`new` being `None`
/// signals the path didn't exist before/after. Returns `None` only when
/// both snapshots are identical (nothing changed).
pub fn diff(old: Option<FileState>, new: Option<FileState>) -> Option<FileChange> {
    match (old, new) {
        (None, None) => None,
        (None, Some(new)) => {
            let severity = if new.is_suid || new.is_sgid {
                Severity::Critical
            } else {
                Severity::Warn
            };
            Some(FileChange::created(new, severity))
        }
        (Some(old), None) => Some(FileChange::deleted(old, Severity::Warn)),
        (Some(old), Some(new)) => diff_existing(old, new),
    }
}

fn diff_existing(old: FileState, new: FileState) -> Option<FileChange> {
    let content_changed = old.sha256 != new.sha256;
    let mode_changed = old.mode != new.mode;
    let owner_changed = old.uid != new.uid || old.gid != new.gid;
    let privilege_escalated = (!old.is_suid && new.is_suid) || (!old.is_sgid && new.is_sgid);
    let became_world_writable = !old.is_world_writable && new.is_world_writable;

    if !content_changed && !mode_changed && !owner_changed {
        return None;
    }

    let severity = if privilege_escalated || became_world_writable {
        Severity::Critical
    } else if content_changed {
        Severity::Error
    } else {
        Severity::Warn
    };

    let change = if content_changed {
        FileChange::modified(old, new, severity)
    } else if owner_changed {
        let mut change = FileChange::modified(old.clone(), new, severity);
        change.change_type = ChangeType::OwnerChanged;
        change
    } else {
        let mut change = FileChange::modified(old, new, severity);
        change.change_type = ChangeType::PermissionChanged;
        change
    };

    Some(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn state(sha256: &str) -> FileState {
        FileState {
            path: "/usr/bin/sudo".into(),
            sha256: sha256.into(),
            ..Default::default()
        }
    }

    #[test]
    fn hash_stream_is_deterministic_and_well_formed() {
        let a = hash_stream(Cursor::new(b"setuid binary contents")).unwrap();
        let b = hash_stream(Cursor::new(b"setuid binary contents")).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn hash_stream_differs_for_different_content() {
        let a = hash_stream(Cursor::new(b"one")).unwrap();
        let b = hash_stream(Cursor::new(b"two")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn creation_of_setuid_file_is_critical() {
        let mut new = state("aaa");
        new.is_suid = true;
        let change = diff(None, Some(new)).unwrap();
        assert_eq!(change.severity, Severity::Critical);
        assert_eq!(change.change_type, ChangeType::Created);
    }

    #[test]
    fn content_change_is_error_severity() {
        let change = diff(Some(state("aaa")), Some(state("bbb"))).unwrap();
        assert_eq!(change.severity, Severity::Error);
        assert_eq!(change.change_type, ChangeType::Modified);
    }

    #[test]
    fn gaining_suid_bit_is_critical_even_without_content_change() {
        let old = state("aaa");
        let mut new = state("aaa");
        new.is_suid = true;
        let change = diff(Some(old), Some(new)).unwrap();
        assert_eq!(change.severity, Severity::Critical);
    }

    #[test]
    fn identical_snapshots_produce_no_change() {
        assert!(diff(Some(state("aaa")), Some(state("aaa"))).is_none());
    }

    #[test]
    fn deletion_is_flagged() {
        let change = diff(Some(state("aaa")), None).unwrap();
        assert_eq!(change.change_type, ChangeType::Deleted);
    }
}
