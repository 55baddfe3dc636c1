//! FIM baseline persistence (§6.3): JSON keyed by path, replaced with an
//! atomic rename after each scan so a crash mid-write never leaves a
//! later scan reading a half-written baseline.

use std::collections::BTreeMap;
use std::path::Path;

use amoskys_core::error::{codes, CoreError};
use amoskys_envelope::FileState;
use serde::{Deserialize, Serialize};

#[derive(Default, Serialize, Deserialize)]
pub struct Baseline {
    pub files: BTreeMap<String, FileState>,
}

impl Baseline {
    /// Loads the baseline at `path`. A missing file is not an error —
    /// it just means this is the agent's first scan — and yields an
    /// empty baseline instead.
    pub fn load(path: &Path) -> Result<Self, CoreError> {
        match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CoreError::new(codes::STORE_SCHEMA, "malformed fim baseline file").with_cause(e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(CoreError::new(codes::STORE_READ_FAILED, "failed to read fim baseline file").with_cause(e))
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CoreError::new(codes::STORE_WRITE_FAILED, "failed to create fim baseline directory").with_cause(e)
                })?;
            }
        }
        let tmp_path = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to serialize fim baseline").with_cause(e))?;
        std::fs::write(&tmp_path, bytes).map_err(|e| {
            CoreError::new(codes::STORE_WRITE_FAILED, "failed to write fim baseline temp file").with_cause(e)
        })?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to replace fim baseline file").with_cause(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_empty_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let baseline = Baseline::load(&dir.path().join("nope.json")).unwrap();
        assert!(baseline.files.is_empty());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        let mut baseline = Baseline::default();
        baseline.files.insert(
            "/usr/bin/sudo".into(),
            FileState {
                path: "/usr/bin/sudo".into(),
                sha256: "abc".into(),
                ..Default::default()
            },
        );
        baseline.save(&path).unwrap();

        let loaded = Baseline::load(&path).unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert_eq!(loaded.files["/usr/bin/sudo"].sha256, "abc");
    }

    #[test]
    fn save_replaces_an_existing_baseline_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        Baseline::default().save(&path).unwrap();

        let mut second = Baseline::default();
        second.files.insert("/etc/passwd".into(), FileState::default());
        second.save(&path).unwrap();

        let loaded = Baseline::load(&path).unwrap();
        assert_eq!(loaded.files.len(), 1);
        assert!(!path.with_extension("tmp").exists());
    }
}
