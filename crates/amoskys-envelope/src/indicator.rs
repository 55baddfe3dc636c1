//! Threat indicators (§3.4) — the structured output of the detection
//! primitives library, carried inside a [`crate::telemetry::SecurityEvent`].

use serde::{Deserialize, Serialize};

/// Coarse kill-chain stage, used purely as a descriptive label on
/// indicators and (aggregated) on incidents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AttackPhase {
    Reconnaissance,
    InitialAccess,
    Execution,
    Persistence,
    PrivilegeEscalation,
    DefenseEvasion,
    CredentialAccess,
    LateralMovement,
    CommandAndControl,
    Exfiltration,
    Impact,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ThreatIndicator {
    pub indicator_type: String,
    pub value: String,
    /// Confidence the producing primitive has in this indicator, in
    /// `[0.0, 1.0]`.
    pub confidence: f64,
    pub attack_phase: AttackPhase,
    pub mitre_techniques: Vec<String>,
    pub description: String,
    pub source: String,
    pub ts_ns: u64,
}

impl ThreatIndicator {
    /// Clamp-constructing helper so primitives don't have to remember to
    /// clamp their own confidence math at every call site.
    pub fn new(
        indicator_type: impl Into<String>,
        value: impl Into<String>,
        confidence: f64,
        attack_phase: AttackPhase,
        source: impl Into<String>,
        ts_ns: u64,
    ) -> Self {
        Self {
            indicator_type: indicator_type.into(),
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
            attack_phase,
            mitre_techniques: Vec::new(),
            description: String::new(),
            source: source.into(),
            ts_ns,
        }
    }

    pub fn with_techniques(mut self, techniques: impl IntoIterator<Item = String>) -> Self {
        self.mitre_techniques = techniques.into_iter().collect();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
