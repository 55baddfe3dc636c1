//! Device telemetry batches and the typed event bodies they carry (§3.2).

use serde::{Deserialize, Serialize};

use crate::flow::FlowEvent;
use crate::indicator::ThreatIndicator;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DeviceType {
    Endpoint,
    Medical,
    Industrial,
    Iot,
    Network,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Security,
    Flow,
    Process,
    Audit,
}

/// Ordered so that `Severity::Critical > Severity::Info` holds — the §3.2
/// invariant that severity is monotone with business impact is exactly
/// "derive the natural `Ord`, declare variants low-to-high".
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warn,
    Error,
    Critical,
}

/// Coarse classification of an auth-adjacent security event. `Generic`
/// covers anything that doesn't need rule-specific handling (most
/// `ThreatIndicator`-only events from the detection primitives land here).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SecurityEventKind {
    SshAuthFailure,
    SshAuthSuccess,
    SudoExec,
    Generic,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,
    /// Authenticated (or attempted) user, when applicable.
    pub actor: Option<String>,
    /// Remote peer address for auth events (SSH source IP).
    pub remote_addr: Option<String>,
    /// Full command line, for `SudoExec` and similar.
    pub command: Option<String>,
    pub indicators: Vec<ThreatIndicator>,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind) -> Self {
        Self {
            kind,
            actor: None,
            remote_addr: None,
            command: None,
            indicators: Vec::new(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_indicators(mut self, indicators: Vec<ThreatIndicator>) -> Self {
        self.indicators = indicators;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AuditAction {
    Created,
    Deleted,
    Modified,
    PermissionChanged,
    OwnerChanged,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub path: String,
    /// Set when `path` matched a persistence-path tripwire prefix table
    /// entry (§4.5); used directly by the persistence-after-auth rule.
    pub persistence_class: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessEvent {
    pub pid: u32,
    pub ppid: u32,
    pub executable: String,
    pub cmdline: String,
    /// Whether the parent process is a known interactive shell
    /// (bash/zsh/sh/...), used by the suspicious-process-tree rule.
    pub parent_is_shell: bool,
    pub user: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum TelemetryBody {
    Security(SecurityEvent),
    Flow(FlowEvent),
    Process(ProcessEvent),
    Audit(AuditEvent),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub event_ts_ns: u64,
    pub body: TelemetryBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeviceTelemetry {
    pub device_id: String,
    pub device_type: DeviceType,
    pub collection_ts_ns: u64,
    pub events: Vec<TelemetryEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_monotone() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error > Severity::Warn);
        assert!(Severity::Warn > Severity::Info);
    }
}
