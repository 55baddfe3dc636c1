//! Queryable store of admitted telemetry events (§3.7), keyed for the
//! correlation engine's per-device window queries.

use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use amoskys_envelope::{EventType, Severity};
use libsql::{params, Connection, Database};

pub struct StoredTelemetryEvent {
    pub id: String,
    pub device_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub event_ts_ns: u64,
    pub payload_json: String,
}

pub struct TelemetryStore {
    db: Arc<Database>,
}

impl TelemetryStore {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn connection(&self) -> Result<Connection, CoreError> {
        self.db
            .connect()
            .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to acquire store connection").with_cause(e))
    }

    pub async fn insert(
        &self,
        id: &str,
        device_id: &str,
        event_type: EventType,
        severity: Severity,
        event_ts_ns: u64,
        payload_json: &str,
    ) -> Result<(), CoreError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT OR REPLACE INTO telemetry_events (id, device_id, event_type, severity, event_ts_ns, payload_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                device_id,
                event_type_tag(event_type),
                severity_tag(severity),
                event_ts_ns as i64,
                payload_json
            ],
        )
        .await
        .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to insert telemetry event").with_cause(e))?;
        Ok(())
    }

    /// Events for `device_id` with `event_ts_ns` in `[since_ts_ns, until_ts_ns]`,
    /// the shape the correlation engine's sliding window needs on
    /// restart/catch-up.
    pub async fn window(
        &self,
        device_id: &str,
        since_ts_ns: u64,
        until_ts_ns: u64,
    ) -> Result<Vec<StoredTelemetryEvent>, CoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT id, device_id, event_type, severity, event_ts_ns, payload_json FROM telemetry_events \
                 WHERE device_id = ?1 AND event_ts_ns BETWEEN ?2 AND ?3 ORDER BY event_ts_ns ASC",
                params![device_id, since_ts_ns as i64, until_ts_ns as i64],
            )
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to query telemetry window").with_cause(e))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to iterate telemetry window").with_cause(e))?
        {
            let event_type_raw: String = row.get(2).map_err(|e| {
                CoreError::new(codes::STORE_READ_FAILED, "missing event_type column").with_cause(e)
            })?;
            let severity_raw: String = row.get(3).map_err(|e| {
                CoreError::new(codes::STORE_READ_FAILED, "missing severity column").with_cause(e)
            })?;
            let event_ts_ns: i64 = row
                .get(4)
                .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing event_ts_ns column").with_cause(e))?;
            events.push(StoredTelemetryEvent {
                id: row.get(0).map_err(|e| {
                    CoreError::new(codes::STORE_READ_FAILED, "missing id column").with_cause(e)
                })?,
                device_id: row.get(1).map_err(|e| {
                    CoreError::new(codes::STORE_READ_FAILED, "missing device_id column").with_cause(e)
                })?,
                event_type: parse_event_type(&event_type_raw)?,
                severity: parse_severity(&severity_raw)?,
                event_ts_ns: event_ts_ns as u64,
                payload_json: row.get(5).map_err(|e| {
                    CoreError::new(codes::STORE_READ_FAILED, "missing payload_json column").with_cause(e)
                })?,
            });
        }
        Ok(events)
    }
}

fn event_type_tag(event_type: EventType) -> &'static str {
    match event_type {
        EventType::Security => "security",
        EventType::Flow => "flow",
        EventType::Process => "process",
        EventType::Audit => "audit",
    }
}

fn parse_event_type(raw: &str) -> Result<EventType, CoreError> {
    match raw {
        "security" => Ok(EventType::Security),
        "flow" => Ok(EventType::Flow),
        "process" => Ok(EventType::Process),
        "audit" => Ok(EventType::Audit),
        other => Err(CoreError::new(
            codes::STORE_READ_FAILED,
            format!("unrecognized event_type '{other}' in telemetry_events row"),
        )),
    }
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
            format!("unrecognized severity '{other}' in telemetry_events row"),
        )),
    }
}
