//! Incident persistence and the incident state machine (§2 supplemented
//! feature, resolving the lifecycle left implicit in the correlation
//! engine's incident-emission contract).
//!
//! `Open` is the only entry state a freshly emitted incident can have.
//! `Resolved` and `FalsePositive` are terminal: once an analyst marks an
//! incident one way or the other there is no path back to `Open` short
//! of the correlation engine emitting a fresh incident.

use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use amoskys_envelope::Severity;
use libsql::{params, Connection, Database};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IncidentState {
    Open,
    Acknowledged,
    Resolved,
    FalsePositive,
}

impl IncidentState {
    fn tag(self) -> &'static str {
        match self {
            IncidentState::Open => "open",
            IncidentState::Acknowledged => "acknowledged",
            IncidentState::Resolved => "resolved",
            IncidentState::FalsePositive => "false_positive",
        }
    }

    fn parse(raw: &str) -> Result<Self, CoreError> {
        match raw {
            "open" => Ok(IncidentState::Open),
            "acknowledged" => Ok(IncidentState::Acknowledged),
            "resolved" => Ok(IncidentState::Resolved),
            "false_positive" => Ok(IncidentState::FalsePositive),
            other => Err(CoreError::new(
                codes::STORE_READ_FAILED,
                format!("unrecognized incident state '{other}'"),
            )),
        }
    }

    /// Whether transitioning from `self` to `next` is allowed.
    pub fn can_transition_to(self, next: IncidentState) -> bool {
        use IncidentState::*;
        matches!(
            (self, next),
            (Open, Acknowledged) | (Open, Resolved) | (Open, FalsePositive)
                | (Acknowledged, Resolved) | (Acknowledged, FalsePositive)
        )
    }
}

pub struct Incident {
    pub id: String,
    pub rule_id: String,
    pub device_id: String,
    pub severity: Severity,
    pub state: IncidentState,
    pub summary: String,
    pub mitre_techniques: Vec<String>,
    pub indicators_json: String,
    pub created_ts_ns: u64,
    pub updated_ts_ns: u64,
}

pub struct IncidentStore {
    db: Arc<Database>,
}

impl IncidentStore {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn connection(&self) -> Result<Connection, CoreError> {
        self.db
            .connect()
            .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to acquire store connection").with_cause(e))
    }

    /// Persists a newly emitted incident. Always enters at `Open` — the
    /// correlation engine has no opinion on acknowledgement or
    /// resolution, only on detection.
    pub async fn create(
        &self,
        id: &str,
        rule_id: &str,
        device_id: &str,
        severity: Severity,
        summary: &str,
        mitre_techniques: &[String],
        indicators_json: &str,
        ts_ns: u64,
    ) -> Result<(), CoreError> {
        let conn = self.connection()?;
        let mitre_json = serde_json::to_string(mitre_techniques)
            .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to serialize mitre techniques").with_cause(e))?;
        conn.execute(
            "INSERT INTO incidents (id, rule_id, device_id, severity, state, summary, mitre_json, indicators_json, created_ts_ns, updated_ts_ns) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
            params![
                id,
                rule_id,
                device_id,
                severity_tag(severity),
                IncidentState::Open.tag(),
                summary,
                mitre_json,
                indicators_json,
                ts_ns as i64
            ],
        )
        .await
        .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to create incident").with_cause(e))?;
        Ok(())
    }

    /// Applies a state transition, rejecting it (without touching the
    /// row) if it isn't legal from the incident's current state.
    pub async fn transition(&self, id: &str, next: IncidentState, ts_ns: u64) -> Result<(), CoreError> {
        let incident = self.get(id).await?;
        if !incident.state.can_transition_to(next) {
            return Err(CoreError::new(
                codes::STORE_WRITE_FAILED,
                format!(
                    "illegal incident transition {:?} -> {:?} for {id}",
                    incident.state, next
                ),
            )
            .with_category(amoskys_core::error::ErrorCategory::Permanent));
        }

        let conn = self.connection()?;
        conn.execute(
            "UPDATE incidents SET state = ?1, updated_ts_ns = ?2 WHERE id = ?3",
            params![next.tag(), ts_ns as i64, id],
        )
        .await
        .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to transition incident").with_cause(e))?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Incident, CoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, rule_id, device_id, severity, state, summary, mitre_json, indicators_json, created_ts_ns, updated_ts_ns \
                 FROM incidents WHERE id = ?1",
                params![id],
            )
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to query incident").with_cause(e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to read incident").with_cause(e))?
            .ok_or_else(|| CoreError::new(codes::STORE_READ_FAILED, format!("incident '{id}' not found")))?;
        row_to_incident(&row)
    }

    pub async fn list_open(&self, device_id: &str) -> Result<Vec<Incident>, CoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, rule_id, device_id, severity, state, summary, mitre_json, indicators_json, created_ts_ns, updated_ts_ns \
                 FROM incidents WHERE device_id = ?1 AND state IN ('open', 'acknowledged') ORDER BY created_ts_ns ASC",
                params![device_id],
            )
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to query open incidents").with_cause(e))?;

        let mut incidents = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to iterate open incidents").with_cause(e))?
        {
            incidents.push(row_to_incident(&row)?);
        }
        Ok(incidents)
    }
}

fn row_to_incident(row: &libsql::Row) -> Result<Incident, CoreError> {
    let severity_raw: String = row
        .get(3)
        .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing severity column").with_cause(e))?;
    let state_raw: String = row
        .get(4)
        .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing state column").with_cause(e))?;
    let mitre_json: String = row
        .get(6)
        .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing mitre_json column").with_cause(e))?;
    let created_ts_ns: i64 = row
        .get(8)
        .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing created_ts_ns column").with_cause(e))?;
    let updated_ts_ns: i64 = row
        .get(9)
        .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing updated_ts_ns column").with_cause(e))?;

    Ok(Incident {
        id: row
            .get(0)
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing id column").with_cause(e))?,
        rule_id: row
            .get(1)
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing rule_id column").with_cause(e))?,
        device_id: row
            .get(2)
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing device_id column").with_cause(e))?,
        severity: parse_severity(&severity_raw)?,
        state: IncidentState::parse(&state_raw)?,
        summary: row
            .get(5)
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing summary column").with_cause(e))?,
        mitre_techniques: serde_json::from_str(&mitre_json)
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "malformed mitre_json column").with_cause(e))?,
        indicators_json: row
            .get(7)
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing indicators_json column").with_cause(e))?,
        created_ts_ns: created_ts_ns as u64,
        updated_ts_ns: updated_ts_ns as u64,
    })
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warn => "warn",
        Severity::Error => "error",
        Severity::Critical => "critical",
    }
}

fn parse_severity(raw: &str) -> Result<Severity, CoreError> {
    match raw {
        "info" => Ok(Severity::Info),
        "warn" => Ok(Severity::Warn),
        "error" => Ok(Severity::Error),
        "critical" => Ok(Severity::Critical),
        other => Err(CoreError::new(
            codes::STORE_READ_FAILED,
            format!("unrecognized severity '{other}'"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::IncidentState::*;

    #[test]
    fn open_can_reach_every_terminal_state() {
        assert!(Open.can_transition_to(Acknowledged));
        assert!(Open.can_transition_to(Resolved));
        assert!(Open.can_transition_to(FalsePositive));
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        assert!(!Resolved.can_transition_to(Open));
        assert!(!Resolved.can_transition_to(Acknowledged));
        assert!(!FalsePositive.can_transition_to(Open));
    }

    #[test]
    fn open_cannot_be_reentered() {
        assert!(!Acknowledged.can_transition_to(Open));
    }
}
