//! Ships queued envelopes to the bus and applies the ACK-driven retry
//! policy (§4.2, §7). Runs as the agent's single background shipper
//! task; collectors never talk to the bus directly, they only enqueue.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use amoskys_core::error::{codes, CoreError};
use amoskys_core::retry::{jitter, ExponentialBackoff};
use amoskys_queue::{DurableQueue, NackOutcome, QueuedEntry};
use amoskys_transport::{client, FramedChannel};
use rustls::ClientConfig;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{info, warn};

use crate::shutdown::ShutdownFlag;

/// The status code the bus answers a published frame with (§6.1, §7).
/// Kept local rather than depending on `amoskys-bus`'s own `Ack` type:
/// the shipper only needs to classify the status, and pulling in the
/// whole ingest-server crate just for this enum would invert the
/// workspace's dependency direction (the bus has no business depending
/// on, or being depended on by, the agent).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
enum AckCode {
    Ok,
    Retry,
    Invalid,
    Unauthorized,
    Error,
}

/// The acknowledgement the bus writes back for a published frame (§4.1,
/// §6.1): a status plus a human-readable reason and, on `Retry`, a
/// backoff hint the shipper should honor (jittered ±20%, §4.2) rather
/// than fall back to its own unadvised backoff schedule.
#[derive(Debug, Deserialize)]
struct PublishAck {
    status: AckCode,
    #[allow(dead_code)]
    reason: String,
    backoff_hint_ms: Option<u64>,
}

pub struct ShipperConfig {
    pub bus_addr: SocketAddr,
    pub bus_server_name: String,
    pub tls_config: Arc<ClientConfig>,
    pub max_frame_bytes: usize,
    pub batch_size: i64,
    /// How long to sleep between `peek_batch` calls when the queue is
    /// empty, so an idle agent doesn't spin.
    pub idle_poll_interval: Duration,
}

/// Why [`Shipper::run`] returned.
pub enum ShipperHalt {
    Shutdown,
    /// The bus answered UNAUTHORIZED: §7 says to "stop shipping, surface
    /// fatal alert" — this is terminal, not a retryable condition.
    Unauthorized,
}

pub struct Shipper {
    queue: Arc<DurableQueue>,
    config: ShipperConfig,
    shutdown: ShutdownFlag,
}

impl Shipper {
    pub fn new(queue: Arc<DurableQueue>, config: ShipperConfig, shutdown: ShutdownFlag) -> Self {
        Self {
            queue,
            config,
            shutdown,
        }
    }

    /// Drives the ship loop until shutdown is requested or the bus
    /// reports UNAUTHORIZED. Reconnects, with backoff, whenever the
    /// connection drops or a handshake fails.
    pub async fn run(&self) -> Result<ShipperHalt, CoreError> {
        let mut connect_backoff =
            ExponentialBackoff::new(Duration::from_millis(500)).with_max(Duration::from_secs(60));
        let mut attempt: u64 = 0;

        loop {
            if self.shutdown.is_requested() {
                return Ok(ShipperHalt::Shutdown);
            }

            let channel = match client::connect(
                self.config.bus_addr,
                &self.config.bus_server_name,
                Arc::clone(&self.config.tls_config),
                self.config.max_frame_bytes,
            )
            .await
            {
                Ok(channel) => {
                    connect_backoff.reset();
                    channel
                }
                Err(err) => {
                    attempt += 1;
                    let delay = connect_backoff.next(attempt);
                    warn!(error = %err, delay_ms = delay.as_millis() as u64, "failed to connect to bus, backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            match self.drain_while_connected(&channel).await {
                Ok(halt) => return Ok(halt),
                Err(err) => {
                    warn!(error = %err, "connection to bus lost, reconnecting");
                }
            }
        }
    }

    async fn drain_while_connected<IO>(&self, channel: &FramedChannel<IO>) -> Result<ShipperHalt, CoreError>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(200)).with_max(Duration::from_secs(30));

        loop {
            if self.shutdown.is_requested() {
                return Ok(ShipperHalt::Shutdown);
            }

            let batch = self.queue.peek_batch(self.config.batch_size).await?;
            if batch.is_empty() {
                tokio::time::sleep(self.config.idle_poll_interval).await;
                continue;
            }

            for entry in batch {
                if self.shutdown.is_requested() {
                    return Ok(ShipperHalt::Shutdown);
                }

                let ack = self.ship_entry(channel, &entry).await?;
                match ack.status {
                    AckCode::Ok => {
                        self.queue.ack(entry.seq).await?;
                        backoff.reset();
                    }
                    AckCode::Retry | AckCode::Error => {
                        self.nack_and_backoff(&entry, &mut backoff, ack.backoff_hint_ms).await?;
                    }
                    AckCode::Invalid => {
                        warn!(seq = entry.seq, "bus rejected envelope as invalid, dropping");
                        self.queue.ack(entry.seq).await?;
                    }
                    AckCode::Unauthorized => {
                        warn!(seq = entry.seq, "bus reports this agent is unauthorized, stopping shipper");
                        return Ok(ShipperHalt::Unauthorized);
                    }
                }
            }
        }
    }

    async fn ship_entry<IO>(&self, channel: &FramedChannel<IO>, entry: &QueuedEntry) -> Result<PublishAck, CoreError>
    where
        IO: AsyncRead + AsyncWrite + Unpin + Send,
    {
        channel.write_frame(&entry.envelope_bytes).await?;
        let reply = channel.read_frame().await?.ok_or_else(|| {
            CoreError::new(codes::TRANSPORT_IO, "bus closed the connection before acking")
        })?;
        serde_json::from_slice(&reply)
            .map_err(|e| CoreError::new(codes::TRANSPORT_IO, "bus sent a malformed ack frame").with_cause(e))
    }

    /// Requeues `entry` for retry and sleeps before the next attempt. A
    /// server-advertised `backoff_hint_ms` (§4.2) takes priority over the
    /// shipper's own exponential schedule, jittered ±20% the same way the
    /// schedule's own delays are so a server-directed backoff can't
    /// synchronize retries across agents either.
    async fn nack_and_backoff(
        &self,
        entry: &QueuedEntry,
        backoff: &mut ExponentialBackoff,
        backoff_hint_ms: Option<u64>,
    ) -> Result<(), CoreError> {
        let delay = match backoff_hint_ms {
            Some(hint_ms) => jitter(Duration::from_millis(hint_ms), 0.20, entry.seq as u64),
            None => backoff.next(entry.seq as u64),
        };
        if let NackOutcome::Retrying(retry_count) = self.queue.nack(entry.seq).await? {
            info!(
                seq = entry.seq,
                retry_count,
                delay_ms = delay.as_millis() as u64,
                server_advised = backoff_hint_ms.is_some(),
                "requeued envelope for retry"
            );
        }
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_retry_ack_with_backoff_hint() {
        let json = br#"{"status":"Retry","reason":"Server is overloaded","backoff_hint_ms":2000}"#;
        let ack: PublishAck = serde_json::from_slice(json).unwrap();
        assert_eq!(ack.status, AckCode::Retry);
        assert_eq!(ack.backoff_hint_ms, Some(2000));
    }

    #[test]
    fn parses_an_ok_ack_with_no_backoff_hint() {
        let json = br#"{"status":"Ok","reason":"","backoff_hint_ms":null}"#;
        let ack: PublishAck = serde_json::from_slice(json).unwrap();
        assert_eq!(ack.status, AckCode::Ok);
        assert_eq!(ack.backoff_hint_ms, None);
    }

    #[test]
    fn server_advised_backoff_stays_within_twenty_percent_jitter() {
        for seed in 0u64..20 {
            let delay = jitter(Duration::from_millis(2000), 0.20, seed);
            assert!(delay.as_millis() >= 1600 && delay.as_millis() <= 2400, "{delay:?}");
        }
    }
}
