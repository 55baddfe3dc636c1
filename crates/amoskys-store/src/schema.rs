//! Bootstrap schema shared by the WAL, telemetry store, and incident store.
//! All three live in the same database file per device deployment — a
//! single writer connection per process is enough (§6.3).

use amoskys_core::error::{codes, CoreError};
use libsql::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS wal_entries (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    idempotency_key TEXT    NOT NULL UNIQUE,
    envelope_bytes  BLOB    NOT NULL,
    checksum        TEXT    NOT NULL,
    received_ts_ns  INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS telemetry_events (
    id             TEXT    PRIMARY KEY,
    device_id      TEXT    NOT NULL,
    event_type     TEXT    NOT NULL,
    severity       TEXT    NOT NULL,
    event_ts_ns    INTEGER NOT NULL,
    payload_json   TEXT    NOT NULL
);
CREATE INDEX IF NOT EXISTS telemetry_events_device_ts
    ON telemetry_events (device_id, event_ts_ns);

CREATE TABLE IF NOT EXISTS incidents (
    id              TEXT    PRIMARY KEY,
    rule_id         TEXT    NOT NULL,
    device_id       TEXT    NOT NULL,
    severity        TEXT    NOT NULL,
    state           TEXT    NOT NULL,
    summary         TEXT    NOT NULL,
    mitre_json      TEXT    NOT NULL,
    indicators_json TEXT    NOT NULL,
    created_ts_ns   INTEGER NOT NULL,
    updated_ts_ns   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS incidents_device_state
    ON incidents (device_id, state);
"#;

pub async fn apply(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(SCHEMA)
        .await
        .map_err(|e| CoreError::new(codes::STORE_SCHEMA, "failed to apply store schema").with_cause(e))
}
