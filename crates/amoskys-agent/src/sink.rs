//! Turns a collector's batch of [`TelemetryEvent`]s into a wire
//! [`Envelope`] and hands it to the durable queue (§4.2, §4.3). Every
//! collector funnels through here so encoding, idempotency-key
//! derivation, and the enqueue-time byte cap are handled in one place
//! rather than once per collector.

use std::sync::Arc;

use amoskys_core::error::CoreError;
use amoskys_core::time::Clock;
use amoskys_envelope::{DeviceTelemetry, DeviceType, Envelope, EnvelopeCodec, Payload, TelemetryEvent};
use amoskys_queue::DurableQueue;
use tracing::warn;

pub struct EnvelopeSink {
    queue: Arc<DurableQueue>,
    codec: EnvelopeCodec,
    clock: Arc<dyn Clock>,
    agent_id: String,
    device_type: DeviceType,
}

impl EnvelopeSink {
    pub fn new(
        queue: Arc<DurableQueue>,
        clock: Arc<dyn Clock>,
        agent_id: impl Into<String>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            queue,
            codec: EnvelopeCodec::new(),
            clock,
            agent_id: agent_id.into(),
            device_type,
        }
    }

    /// Batches `events` into one `DeviceTelemetry` payload and enqueues
    /// it for shipping. A collector that produced nothing this cycle
    /// should simply not call this rather than publishing an empty
    /// batch — an empty envelope is a wasted round trip and a wasted
    /// idempotency key.
    pub async fn publish(&self, events: Vec<TelemetryEvent>) -> Result<(), CoreError> {
        if events.is_empty() {
            return Ok(());
        }

        let collection_ts_ns = self.clock.now_ns();
        let telemetry = DeviceTelemetry {
            device_id: self.agent_id.clone(),
            device_type: self.device_type,
            collection_ts_ns,
            events,
        };

        // Stable per-batch key: retries of the same encoded bytes (the
        // queue stores bytes, not the `Envelope` value) always carry the
        // same key, so the bus's dedupe cache collapses a re-delivery
        // instead of double-admitting it.
        let idempotency_key = format!("{}-{}", self.agent_id, collection_ts_ns);
        let envelope = Envelope::new(
            collection_ts_ns,
            idempotency_key,
            self.agent_id.clone(),
            Payload::DeviceTelemetry(telemetry),
        )?;
        let bytes = self.codec.encode(&envelope)?;

        let evicted = self.queue.enqueue(bytes, collection_ts_ns).await?;
        if evicted > 0 {
            warn!(evicted, "local queue over its byte cap, dropped oldest entries");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_core::time::MockClock;
    use amoskys_envelope::{EventType, Severity, TelemetryBody};

    async fn temp_sink() -> (EnvelopeSink, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let queue = Arc::new(DurableQueue::open(path.to_str().unwrap(), 1_000_000, 3).await.unwrap());
        let clock = Arc::new(MockClock::default());
        let sink = EnvelopeSink::new(queue, clock, "agent-1", DeviceType::Endpoint);
        (sink, dir)
    }

    fn sample_event() -> TelemetryEvent {
        TelemetryEvent {
            event_id: "e1".into(),
            event_type: EventType::Process,
            severity: Severity::Info,
            event_ts_ns: 1,
            body: TelemetryBody::Process(amoskys_envelope::ProcessEvent {
                pid: 1,
                ppid: 0,
                executable: "/bin/bash".into(),
                cmdline: "bash".into(),
                parent_is_shell: false,
                user: None,
            }),
        }
    }

    #[tokio::test]
    async fn publishing_an_empty_batch_enqueues_nothing() {
        let (sink, _dir) = temp_sink().await;
        sink.publish(Vec::new()).await.unwrap();
        assert!(sink.queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn publishing_events_enqueues_one_envelope() {
        let (sink, _dir) = temp_sink().await;
        sink.publish(vec![sample_event()]).await.unwrap();
        assert_eq!(sink.queue.len().await.unwrap(), 1);
    }
}
