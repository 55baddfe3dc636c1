//! Detection primitives (§4.5): self-contained, deterministic heuristics
//! the correlation engine and the agent's collectors call directly. None
//! of these talk to the network or touch a clock — callers own
//! timestamps and thresholds so the primitives stay unit-testable and
//! reusable across both the agent and the bus.

pub mod beaconing;
pub mod c2;
pub mod credential_access;
pub mod entropy;
pub mod exfiltration;
pub mod fim;
pub mod flow_stats;
pub mod lolbin;
pub mod persistence;
pub mod reverse_shell;
pub mod suspicious_path;
