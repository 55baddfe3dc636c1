//! Bootstrap schema for the on-disk queue database.

use amoskys_core::error::{codes, CoreError};
use libsql::Connection;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS queue_entries (
    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
    envelope_bytes  BLOB    NOT NULL,
    enqueued_ts_ns  INTEGER NOT NULL,
    retry_count     INTEGER NOT NULL DEFAULT 0
);
"#;

pub async fn apply(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(SCHEMA).await.map_err(|e| {
        CoreError::new(codes::QUEUE_SCHEMA, "failed to apply queue schema").with_cause(e)
    })
}
