//! The durable FIFO queue itself (§4.2).
//!
//! An agent that can't reach the bus (network partition, bus restart,
//! backpressure) must not drop telemetry. Encoded envelopes are appended
//! here before the shipper ever attempts a network write, and removed only
//! once the bus has acknowledged them. The queue is backed by a local
//! `libsql` database file so entries survive an agent restart; a single
//! writer connection is used throughout since `libsql`'s local backend
//! serializes writes at the OS file-lock level anyway.

use amoskys_core::error::{codes, CoreError};
use libsql::{params, Builder, Connection, Database};
use tracing::warn;

use crate::schema;

pub struct QueuedEntry {
    pub seq: i64,
    pub envelope_bytes: Vec<u8>,
    pub enqueued_ts_ns: u64,
    pub retry_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// Still under the retry cap; caller should leave the entry queued and
    /// let backoff decide when to try again.
    Retrying(u32),
    /// Retry cap exceeded; the entry has been removed.
    Dropped,
}

pub struct DurableQueue {
    db: Database,
    max_bytes: u64,
    max_retry: u32,
}

impl DurableQueue {
    /// Opens (creating if absent) the queue database at `path` and applies
    /// its schema. `max_bytes` bounds the total size of unacked entries;
    /// `max_retry` bounds how many times a single entry may be nacked
    /// before it's dropped and logged.
    pub async fn open(path: &str, max_bytes: u64, max_retry: u32) -> Result<Self, CoreError> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_SCHEMA, "failed to open queue database").with_cause(e))?;
        let conn = db
            .connect()
            .map_err(|e| CoreError::new(codes::QUEUE_SCHEMA, "failed to open queue connection").with_cause(e))?;
        schema::apply(&conn).await?;
        Ok(Self {
            db,
            max_bytes,
            max_retry,
        })
    }

    fn connection(&self) -> Result<Connection, CoreError> {
        self.db
            .connect()
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to acquire queue connection").with_cause(e))
    }

    /// Appends an already-encoded envelope, then evicts the oldest
    /// entries (by `seq`) until the queue's total byte footprint is back
    /// under `max_bytes` (§4.2 backpressure behavior: drop the oldest,
    /// not the newest — a shipper that's fallen behind should lose its
    /// stalest telemetry first, since that's the telemetry least likely
    /// to still be useful to a responder by the time it ships). Returns
    /// the number of entries evicted this way, so the caller can count a
    /// dropped-event metric.
    pub async fn enqueue(&self, envelope_bytes: Vec<u8>, enqueued_ts_ns: u64) -> Result<u32, CoreError> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO queue_entries (envelope_bytes, enqueued_ts_ns) VALUES (?1, ?2)",
            params![envelope_bytes, enqueued_ts_ns as i64],
        )
        .await
        .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to append queue entry").with_cause(e))?;
        let new_seq = conn.last_insert_rowid();

        let mut evicted = 0u32;
        while self.total_bytes(&conn).await? > self.max_bytes {
            let oldest_seq = self.oldest_seq(&conn).await?;
            match oldest_seq {
                Some(seq) if seq != new_seq => {
                    conn.execute("DELETE FROM queue_entries WHERE seq = ?1", params![seq])
                        .await
                        .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to evict oldest queue entry").with_cause(e))?;
                    evicted += 1;
                    warn!(seq, "dropped oldest queue entry, queue over its byte cap");
                }
                // Only the just-inserted entry remains and it alone
                // exceeds max_bytes; there's nothing older left to drop.
                _ => break,
            }
        }
        Ok(evicted)
    }

    async fn oldest_seq(&self, conn: &Connection) -> Result<Option<i64>, CoreError> {
        let mut rows = conn
            .query("SELECT seq FROM queue_entries ORDER BY seq ASC LIMIT 1", ())
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to find oldest queue entry").with_cause(e))?;
        match rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "failed to read oldest queue entry").with_cause(e))?
        {
            Some(row) => Ok(Some(row.get(0).map_err(|e| {
                CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "missing seq column").with_cause(e)
            })?)),
            None => Ok(None),
        }
    }

    async fn total_bytes(&self, conn: &Connection) -> Result<u64, CoreError> {
        let mut rows = conn
            .query(
                "SELECT COALESCE(SUM(LENGTH(envelope_bytes)), 0) FROM queue_entries",
                (),
            )
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to size queue").with_cause(e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to size queue").with_cause(e))?
            .expect("SUM(...) always yields exactly one row");
        let total: i64 = row
            .get(0)
            .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "malformed size aggregate").with_cause(e))?;
        Ok(total as u64)
    }

    /// Returns up to `limit` of the oldest unacked entries, in FIFO order.
    pub async fn peek_batch(&self, limit: i64) -> Result<Vec<QueuedEntry>, CoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT seq, envelope_bytes, enqueued_ts_ns, retry_count FROM queue_entries ORDER BY seq ASC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to read queue entries").with_cause(e))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "failed to iterate queue entries").with_cause(e))?
        {
            let seq: i64 = row
                .get(0)
                .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "missing seq column").with_cause(e))?;
            let envelope_bytes: Vec<u8> = row
                .get(1)
                .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "missing envelope_bytes column").with_cause(e))?;
            let enqueued_ts_ns: i64 = row
                .get(2)
                .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "missing enqueued_ts_ns column").with_cause(e))?;
            let retry_count: i64 = row
                .get(3)
                .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "missing retry_count column").with_cause(e))?;
            entries.push(QueuedEntry {
                seq,
                envelope_bytes,
                enqueued_ts_ns: enqueued_ts_ns as u64,
                retry_count: retry_count as u32,
            });
        }
        Ok(entries)
    }

    /// Removes an entry the bus has acknowledged.
    pub async fn ack(&self, seq: i64) -> Result<(), CoreError> {
        let conn = self.connection()?;
        conn.execute("DELETE FROM queue_entries WHERE seq = ?1", params![seq])
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to ack queue entry").with_cause(e))?;
        Ok(())
    }

    /// Records a failed shipping attempt. Drops the entry once
    /// `max_retry` is exceeded rather than retrying forever.
    pub async fn nack(&self, seq: i64) -> Result<NackOutcome, CoreError> {
        let conn = self.connection()?;
        conn.execute(
            "UPDATE queue_entries SET retry_count = retry_count + 1 WHERE seq = ?1",
            params![seq],
        )
        .await
        .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to record retry").with_cause(e))?;

        let mut rows = conn
            .query("SELECT retry_count FROM queue_entries WHERE seq = ?1", params![seq])
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to read retry count").with_cause(e))?;
        let retry_count: i64 = match rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "failed to read retry count").with_cause(e))?
        {
            Some(row) => row
                .get(0)
                .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "missing retry_count column").with_cause(e))?,
            None => return Ok(NackOutcome::Dropped),
        };

        if retry_count as u32 > self.max_retry {
            self.ack(seq).await?;
            warn!(seq, retry_count, "dropping queue entry after exceeding retry cap");
            Ok(NackOutcome::Dropped)
        } else {
            Ok(NackOutcome::Retrying(retry_count as u32))
        }
    }

    pub async fn len(&self) -> Result<i64, CoreError> {
        let conn = self.connection()?;
        let mut rows = conn
            .query("SELECT COUNT(*) FROM queue_entries", ())
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to count queue entries").with_cause(e))?;
        let row = rows
            .next()
            .await
            .map_err(|e| CoreError::new(codes::QUEUE_FSYNC_FAILED, "failed to count queue entries").with_cause(e))?
            .expect("COUNT(*) always yields exactly one row");
        row.get(0)
            .map_err(|e| CoreError::new(codes::QUEUE_CORRUPT_ENTRY, "malformed count aggregate").with_cause(e))
    }

    pub async fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.len().await? == 0)
    }
}
