//! The peer trust map (§4.1 authorization model, §6.2): which agent
//! certificate common names the bus accepts, and where each one's
//! published Ed25519 public key lives.
//!
//! Signature verification against these keys is not yet wired in — see
//! the crate-level notes — so today the map only gates admission by CN.
//! It's kept as a hot-reloadable snapshot so an operator can add or
//! revoke an agent without restarting the bus: `reload` swaps the whole
//! table atomically, and in-flight connections keep whatever snapshot
//! they looked up at accept time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use arc_swap::ArcSwap;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct TrustMapFile {
    agents: HashMap<String, PathBuf>,
}

#[derive(Debug, Default)]
struct TrustMapData {
    agents: HashMap<String, PathBuf>,
}

/// Shared, hot-reloadable trust table. Clone is cheap (one `Arc` bump);
/// every clone observes reloads made through any other clone.
#[derive(Clone)]
pub struct TrustMap {
    inner: Arc<ArcSwap<TrustMapData>>,
}

impl TrustMap {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let data = Self::read(path.as_ref())?;
        Ok(Self {
            inner: Arc::new(ArcSwap::new(Arc::new(data))),
        })
    }

    fn read(path: &Path) -> Result<TrustMapData, CoreError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CoreError::new(codes::TRANSPORT_PEER_UNKNOWN, "failed to read trust map file").with_cause(e)
        })?;
        let parsed: TrustMapFile = serde_yaml::from_str(&raw).map_err(|e| {
            CoreError::new(codes::TRANSPORT_PEER_UNKNOWN, "failed to parse trust map file").with_cause(e)
        })?;
        Ok(TrustMapData {
            agents: parsed.agents,
        })
    }

    /// Re-reads `path` and atomically replaces the in-memory table. Called
    /// from the SIGHUP handler installed by `bin/bus-server`.
    pub fn reload(&self, path: impl AsRef<Path>) -> Result<(), CoreError> {
        let data = Self::read(path.as_ref())?;
        self.inner.store(Arc::new(data));
        Ok(())
    }

    pub fn is_trusted(&self, common_name: &str) -> bool {
        self.inner.load().agents.contains_key(common_name)
    }

    pub fn pubkey_path(&self, common_name: &str) -> Option<PathBuf> {
        self.inner.load().agents.get(common_name).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.load().agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
