//! The write-ahead log (§4.1 step 6, §4.6): the durable record an
//! envelope has been admitted. The in-memory dedupe cache in
//! `amoskys-bus` is the primary defense against double-admission; the
//! WAL's `UNIQUE` constraint on `idempotency_key` is the backstop that
//! catches a duplicate that slipped past a dedupe cache evicted or
//! restarted between the two deliveries.

use std::sync::Arc;

use amoskys_core::error::{codes, CoreError};
use libsql::{params, Connection, Database};

use crate::checksum;

pub struct WalEntry {
    pub seq: i64,
    pub idempotency_key: String,
    pub envelope_bytes: Vec<u8>,
    pub checksum: String,
    pub received_ts_ns: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// The idempotency key was already present; the caller should treat
    /// this the same as a successful append (the envelope is durable
    /// either way) but must not re-run downstream side effects.
    Duplicate,
}

pub struct Wal {
    db: Arc<Database>,
}

impl Wal {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    fn connection(&self) -> Result<Connection, CoreError> {
        self.db
            .connect()
            .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to acquire store connection").with_cause(e))
    }

    pub async fn append(
        &self,
        idempotency_key: &str,
        envelope_bytes: &[u8],
        received_ts_ns: u64,
    ) -> Result<AppendOutcome, CoreError> {
        let conn = self.connection()?;
        let digest = checksum::checksum_hex(envelope_bytes);

        let result = conn
            .execute(
                "INSERT INTO wal_entries (idempotency_key, envelope_bytes, checksum, received_ts_ns) VALUES (?1, ?2, ?3, ?4)",
                params![idempotency_key, envelope_bytes, digest, received_ts_ns as i64],
            )
            .await;

        match result {
            Ok(_) => Ok(AppendOutcome::Appended),
            Err(e) if is_unique_violation(&e) => Ok(AppendOutcome::Duplicate),
            Err(e) => Err(CoreError::new(codes::BUS_WAL_WRITE_FAILED, "failed to append wal entry").with_cause(e)),
        }
    }

    pub async fn count(&self) -> Result<i64, CoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM wal_entries", ())
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to count wal entries").with_cause(e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to count wal entries").with_cause(e))?
            .expect("COUNT(*) always yields exactly one row");
        row.get(0)
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "malformed count aggregate").with_cause(e))
    }

    /// Whether `idempotency_key` is already durable, for a caller that
    /// wants to check the backstop directly rather than go through
    /// `append`'s unique-violation path.
    pub async fn contains(&self, idempotency_key: &str) -> Result<bool, CoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM wal_entries WHERE idempotency_key = ?1 LIMIT 1",
                params![idempotency_key],
            )
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to look up wal entry").with_cause(e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to look up wal entry").with_cause(e))?;
        Ok(row.is_some())
    }

    /// Entries with `seq > after_seq`, in append order, for a downstream
    /// consumer replaying the log after a crash or a restart. Pass `0` to
    /// scan from the beginning.
    pub async fn scan(&self, after_seq: i64, limit: i64) -> Result<Vec<WalEntry>, CoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT seq, idempotency_key, envelope_bytes, checksum, received_ts_ns FROM wal_entries \
                 WHERE seq > ?1 ORDER BY seq ASC LIMIT ?2",
                params![after_seq, limit],
            )
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to scan wal entries").with_cause(e))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "failed to iterate wal entries").with_cause(e))?
        {
            let received_ts_ns: i64 = row
                .get(4)
                .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing received_ts_ns column").with_cause(e))?;
            entries.push(WalEntry {
                seq: row
                    .get(0)
                    .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing seq column").with_cause(e))?,
                idempotency_key: row.get(1).map_err(|e| {
                    CoreError::new(codes::STORE_READ_FAILED, "missing idempotency_key column").with_cause(e)
                })?,
                envelope_bytes: row.get(2).map_err(|e| {
                    CoreError::new(codes::STORE_READ_FAILED, "missing envelope_bytes column").with_cause(e)
                })?,
                checksum: row
                    .get(3)
                    .map_err(|e| CoreError::new(codes::STORE_READ_FAILED, "missing checksum column").with_cause(e))?,
                received_ts_ns: received_ts_ns as u64,
            });
        }
        Ok(entries)
    }

    /// Deletes WAL rows older than `cutoff_ts_ns`, returning the number
    /// removed. The retention window is a deployment choice (§9);
    /// `bin/bus-server` runs this on a timer.
    pub async fn prune_older_than(&self, cutoff_ts_ns: u64) -> Result<u64, CoreError> {
        let conn = self.connection()?;
        let before = self.count().await?;
        conn.execute(
            "DELETE FROM wal_entries WHERE received_ts_ns < ?1",
            params![cutoff_ts_ns as i64],
        )
        .await
        .map_err(|e| CoreError::new(codes::STORE_WRITE_FAILED, "failed to prune wal entries").with_cause(e))?;
        let after = self.count().await?;
        Ok((before - after).max(0) as u64)
    }
}

fn is_unique_violation(err: &libsql::Error) -> bool {
    err.to_string().to_lowercase().contains("unique")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    async fn open_temp() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = Store::open(path.to_str().unwrap()).await.unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn append_then_duplicate_is_detected() {
        let (store, _dir) = open_temp().await;
        let wal = store.wal();
        let outcome = wal.append("k1", b"payload", 100).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Appended);

        let outcome = wal.append("k1", b"payload", 200).await.unwrap();
        assert_eq!(outcome, AppendOutcome::Duplicate);
        assert_eq!(wal.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn contains_reflects_appended_keys() {
        let (store, _dir) = open_temp().await;
        let wal = store.wal();
        assert!(!wal.contains("k1").await.unwrap());
        wal.append("k1", b"payload", 100).await.unwrap();
        assert!(wal.contains("k1").await.unwrap());
        assert!(!wal.contains("k2").await.unwrap());
    }

    #[tokio::test]
    async fn scan_returns_entries_in_append_order_after_cursor() {
        let (store, _dir) = open_temp().await;
        let wal = store.wal();
        wal.append("k1", b"a", 100).await.unwrap();
        wal.append("k2", b"b", 200).await.unwrap();
        wal.append("k3", b"c", 300).await.unwrap();

        let all = wal.scan(0, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].idempotency_key, "k1");
        assert_eq!(all[2].idempotency_key, "k3");

        let after_first = wal.scan(all[0].seq, 10).await.unwrap();
        assert_eq!(after_first.len(), 2);
        assert_eq!(after_first[0].idempotency_key, "k2");

        let limited = wal.scan(0, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].idempotency_key, "k1");
    }

    #[tokio::test]
    async fn prune_removes_only_old_entries() {
        let (store, _dir) = open_temp().await;
        let wal = store.wal();
        wal.append("k1", b"a", 100).await.unwrap();
        wal.append("k2", b"b", 900).await.unwrap();

        let removed = wal.prune_older_than(500).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(wal.count().await.unwrap(), 1);
    }
}
