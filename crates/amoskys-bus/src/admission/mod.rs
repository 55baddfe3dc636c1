//! The ordered admission pipeline a raw inbound frame travels through
//! before it's durable (§4.1 steps 1-6): overload shedding, size check,
//! in-flight accounting, payload extraction, dedupe, WAL append. Each
//! step can end the pipeline early with the [`PublishAck`] an agent's
//! shipper needs in order to decide whether and how long to wait before
//! retrying.

mod dedupe;
mod gate;

pub use dedupe::DedupeCache;
pub use gate::{AdmissionGate, InflightPermit, ShedReason};

use std::sync::Arc;

use amoskys_core::config::BusConfig;
use amoskys_core::error::CoreError;
use amoskys_envelope::{Envelope, EnvelopeCodec, EventType, Payload, Severity, TelemetryBody, TelemetryEvent};
use amoskys_store::{AppendOutcome, Store};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::ack::{Ack, PublishAck};
use crate::metrics::BusMetrics;

/// One decomposed telemetry event plus the device it belongs to, handed
/// to whoever wants a live fan-out of admitted events (the correlation
/// engine's window, per §4.4's "WAL-append fan-out" input source) rather
/// than having to poll the telemetry store.
pub type TelemetryFanOut = (String, TelemetryEvent);

pub struct AdmissionPipeline {
    config: BusConfig,
    gate: AdmissionGate,
    dedupe: DedupeCache,
    store: Arc<Store>,
    codec: EnvelopeCodec,
    metrics: Arc<BusMetrics>,
    telemetry_tx: Option<UnboundedSender<TelemetryFanOut>>,
}

impl AdmissionPipeline {
    pub fn new(
        config: BusConfig,
        store: Arc<Store>,
        metrics: Arc<BusMetrics>,
        clock: Arc<dyn amoskys_core::time::Clock>,
    ) -> Self {
        let gate = AdmissionGate::new(config.overload_mode, config.max_inflight, config.overload_flag_seed);
        let dedupe = DedupeCache::new(config.dedupe_ttl.as_nanos() as u64, config.dedupe_max, clock);
        Self {
            config,
            gate,
            dedupe,
            store,
            codec: EnvelopeCodec::new(),
            metrics,
            telemetry_tx: None,
        }
    }

    /// Wires a live channel that receives every admitted event as soon as
    /// it's durable, one send per [`TelemetryEvent`] in a batch. A
    /// receiver lagging or dropped never blocks admission: sends are
    /// fire-and-forget and failures are ignored.
    pub fn with_telemetry_sender(mut self, tx: UnboundedSender<TelemetryFanOut>) -> Self {
        self.telemetry_tx = Some(tx);
        self
    }

    pub fn inflight(&self) -> usize {
        self.gate.inflight()
    }

    /// Flips the runtime overload flag (§4.1 step 1, §6.4's `BUS_OVERLOAD`),
    /// e.g. from a SIGHUP-triggered config reload that re-reads the
    /// environment. Only `Auto` mode observes it.
    pub fn set_overloaded(&self, overloaded: bool) {
        self.gate.set_overloaded(overloaded);
    }

    pub fn overloaded(&self) -> bool {
        self.gate.overloaded()
    }

    /// Runs one raw wire frame through the full pipeline, returning the
    /// [`PublishAck`] to write back to the peer. Never panics on
    /// malformed input — every rejection path is a typed ack, not a
    /// propagated error, since the caller (the accept loop) has nothing
    /// to do with a `Result` here but turn it into the wire message
    /// anyway.
    pub async fn admit(&self, raw_frame: &[u8], received_ts_ns: u64) -> PublishAck {
        // Step 1: overload shedding.
        let _permit: InflightPermit<'_> = match self.gate.try_acquire_detailed() {
            Ok(permit) => permit,
            Err(ShedReason::Overloaded) => {
                self.metrics.record_outcome("shed");
                return PublishAck::retry("Server is overloaded", 2000);
            }
            Err(ShedReason::AtCapacity) => {
                self.metrics.record_outcome("shed");
                let inflight = self.gate.inflight() + 1;
                return PublishAck::retry(format!("Server at capacity ({inflight} inflight)"), 1000);
            }
        };

        match self.admit_inner(raw_frame, received_ts_ns).await {
            Ok(ack) => ack,
            Err(err) => {
                let ack = PublishAck::from_core_error(&err);
                warn!(code = err.code(), status = ?ack.status, "admission rejected frame");
                self.record(ack.status);
                ack
            }
        }
    }

    async fn admit_inner(&self, raw_frame: &[u8], received_ts_ns: u64) -> Result<PublishAck, CoreError> {
        // Step 2: size check, enforced by the codec against the
        // configured limit before it allocates a decoded `Envelope`.
        let envelope = self.codec.decode_bounded(raw_frame, self.config.max_env_bytes)?;

        // Step 3 (in-flight accounting) already happened via the permit
        // held for the lifetime of this call.

        // Step 4: payload extraction / structural validation. A `Legacy`
        // payload that doesn't parse into a known variant is accepted as
        // opaque bytes rather than rejected — the bus can't know every
        // future producer's schema, so best-effort storage beats a hard
        // failure here.
        envelope.validate()?;

        // Step 5: dedupe.
        let key = envelope.idempotency_key()?;
        if self.dedupe.check_and_insert(key.as_str()) {
            debug!(key = key.as_str(), "duplicate envelope, already admitted");
            self.record(Ack::Ok);
            return Ok(PublishAck::ok());
        }

        // Step 6: durable WAL append. The WAL's own unique constraint is
        // the backstop for a key that slipped past the in-memory cache
        // (e.g. after a bus restart), so a `Duplicate` outcome here is
        // still a success, not a retry.
        match self.store.wal().append(key.as_str(), raw_frame, received_ts_ns).await? {
            AppendOutcome::Appended => {
                self.record(Ack::Ok);
                self.persist_telemetry(&envelope).await;
            }
            AppendOutcome::Duplicate => self.record(Ack::Ok),
        }

        Ok(PublishAck::ok())
    }

    /// Decomposes an admitted envelope's payload into the per-device
    /// events the telemetry store and correlation engine key on, and
    /// forwards each one to the live fan-out channel if one is wired. A
    /// `Legacy` payload carries nothing structured to correlate and is
    /// skipped. Storage or channel failures are logged, not propagated —
    /// the envelope is already durably WAL-appended by this point, so a
    /// telemetry-projection failure must not turn a successful admission
    /// into a retry.
    async fn persist_telemetry(&self, envelope: &Envelope) {
        let device_id = envelope.source_identity.clone();
        let events: Vec<TelemetryEvent> = match &envelope.payload {
            Payload::DeviceTelemetry(data) => data.events.clone(),
            Payload::FlowEvent(flow) => vec![TelemetryEvent {
                event_id: format!("flow-{}-{}", device_id, flow.start_ts_ns),
                event_type: EventType::Flow,
                severity: Severity::Info,
                event_ts_ns: flow.start_ts_ns,
                body: TelemetryBody::Flow(flow.clone()),
            }],
            Payload::ProcessEvent(proc) => vec![TelemetryEvent {
                event_id: format!("proc-{}-{}", device_id, proc.pid),
                event_type: EventType::Process,
                severity: Severity::Info,
                event_ts_ns: envelope.ts_ns,
                body: TelemetryBody::Process(proc.clone()),
            }],
            Payload::Legacy(_) => Vec::new(),
        };

        for event in events {
            if let Ok(payload_json) = serde_json::to_string(&event.body) {
                if let Err(err) = self
                    .store
                    .telemetry()
                    .insert(&event.event_id, &device_id, event.event_type, event.severity, event.event_ts_ns, &payload_json)
                    .await
                {
                    warn!(device_id = %device_id, error = %err, "failed to persist telemetry event");
                }
            }

            if let Some(tx) = &self.telemetry_tx {
                let _ = tx.send((device_id.clone(), event));
            }
        }
    }

    fn record(&self, ack: Ack) {
        let label = match ack {
            Ack::Ok => "ok",
            Ack::Retry => "retry",
            Ack::Invalid => "invalid",
            Ack::Unauthorized => "unauthorized",
            Ack::Error => "error",
        };
        self.metrics.record_outcome(label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_core::config::OverloadMode;
    use amoskys_core::time::MockClock;
    use amoskys_envelope::{Direction, Envelope, FlowEvent, Payload};

    async fn temp_pipeline() -> (AdmissionPipeline, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let store = Arc::new(Store::open(path.to_str().unwrap()).await.unwrap());
        let metrics = Arc::new(BusMetrics::new().unwrap());
        let clock = Arc::new(MockClock::default());
        let mut config = BusConfig::default();
        config.overload_mode = OverloadMode::Auto;
        let pipeline = AdmissionPipeline::new(config, store, metrics, clock);
        (pipeline, dir)
    }

    fn sample_frame(codec: &EnvelopeCodec, key: &str) -> Vec<u8> {
        let flow = FlowEvent {
            src_addr: "10.0.0.1".into(),
            src_port: 1111,
            dst_addr: "10.0.0.2".into(),
            dst_port: 443,
            protocol: "tcp".into(),
            direction: Direction::Outbound,
            bytes_in: 1,
            bytes_out: 2,
            packet_count: 1,
            start_ts_ns: 1,
            end_ts_ns: 2,
        };
        let envelope = Envelope::new(1, key, "agent-1", Payload::FlowEvent(flow)).unwrap();
        codec.encode(&envelope).unwrap()
    }

    #[tokio::test]
    async fn admits_a_well_formed_frame() {
        let (pipeline, _dir) = temp_pipeline().await;
        let codec = EnvelopeCodec::new();
        let frame = sample_frame(&codec, "k1");
        assert_eq!(pipeline.admit(&frame, 100).await.status, Ack::Ok);
        assert_eq!(pipeline.inflight(), 0);
    }

    #[tokio::test]
    async fn duplicate_frame_still_acks_ok() {
        let (pipeline, _dir) = temp_pipeline().await;
        let codec = EnvelopeCodec::new();
        let frame = sample_frame(&codec, "k1");
        assert_eq!(pipeline.admit(&frame, 100).await.status, Ack::Ok);
        assert_eq!(pipeline.admit(&frame, 200).await.status, Ack::Ok);
    }

    #[tokio::test]
    async fn oversized_frame_is_invalid() {
        let (pipeline, _dir) = temp_pipeline().await;
        let junk = vec![0u8; 200_000];
        let ack = pipeline.admit(&junk, 100).await;
        assert_eq!(ack.status, Ack::Invalid);
        assert!(ack.reason.contains("Envelope too large (200000 > 131072 bytes)"), "{}", ack.reason);
        assert_eq!(ack.backoff_hint_ms, None);
    }

    #[tokio::test]
    async fn overload_flag_seed_sheds_an_idle_bus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overload-seed.db");
        let store = Arc::new(Store::open(path.to_str().unwrap()).await.unwrap());
        let metrics = Arc::new(BusMetrics::new().unwrap());
        let clock = Arc::new(MockClock::default());
        let mut config = BusConfig::default();
        config.overload_mode = OverloadMode::Auto;
        config.overload_flag_seed = true;
        let pipeline = AdmissionPipeline::new(config, store, metrics, clock);
        assert_eq!(pipeline.inflight(), 0);
        assert!(pipeline.overloaded());

        let codec = EnvelopeCodec::new();
        let frame = sample_frame(&codec, "k1");
        let ack = pipeline.admit(&frame, 100).await;
        assert_eq!(ack.status, Ack::Retry);
        assert_eq!(ack.backoff_hint_ms, Some(2000));

        pipeline.set_overloaded(false);
        assert_eq!(pipeline.admit(&frame, 100).await.status, Ack::Ok);
    }

    #[tokio::test]
    async fn forced_overload_sheds_with_retry() {
        let (pipeline, _dir) = temp_pipeline().await;
        assert_eq!(pipeline.inflight(), 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shedding.db");
        let store = Arc::new(Store::open(path.to_str().unwrap()).await.unwrap());
        let metrics = Arc::new(BusMetrics::new().unwrap());
        let clock = Arc::new(MockClock::default());
        let mut config = BusConfig::default();
        config.overload_mode = OverloadMode::On;
        let shedding = AdmissionPipeline::new(config, store, metrics, clock);
        let codec = EnvelopeCodec::new();
        let frame = sample_frame(&codec, "k1");
        let ack = shedding.admit(&frame, 100).await;
        assert_eq!(ack.status, Ack::Retry);
        assert_eq!(ack.reason, "Server is overloaded");
        assert_eq!(ack.backoff_hint_ms, Some(2000));
    }

    #[tokio::test]
    async fn at_capacity_sheds_with_a_1000ms_backoff_hint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capacity.db");
        let store = Arc::new(Store::open(path.to_str().unwrap()).await.unwrap());
        let metrics = Arc::new(BusMetrics::new().unwrap());
        let clock = Arc::new(MockClock::default());
        let mut config = BusConfig::default();
        config.overload_mode = OverloadMode::Auto;
        config.max_inflight = 0;
        let pipeline = AdmissionPipeline::new(config, store, metrics, clock);
        let codec = EnvelopeCodec::new();

        let frame = sample_frame(&codec, "k-over");
        let ack = pipeline.admit(&frame, 100).await;
        assert_eq!(ack.status, Ack::Retry);
        assert_eq!(ack.backoff_hint_ms, Some(1000));
        assert!(ack.reason.contains("capacity"), "{}", ack.reason);
    }

    #[tokio::test]
    async fn device_telemetry_events_are_forwarded_to_the_fan_out_channel() {
        use amoskys_envelope::{DeviceType, SecurityEvent, SecurityEventKind};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fanout.db");
        let store = Arc::new(Store::open(path.to_str().unwrap()).await.unwrap());
        let metrics = Arc::new(BusMetrics::new().unwrap());
        let clock = Arc::new(MockClock::default());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let pipeline = AdmissionPipeline::new(BusConfig::default(), Arc::clone(&store), metrics, clock)
            .with_telemetry_sender(tx);

        let telemetry = amoskys_envelope::DeviceTelemetry {
            device_id: "device-1".into(),
            device_type: DeviceType::Endpoint,
            collection_ts_ns: 1,
            events: vec![TelemetryEvent {
                event_id: "e1".into(),
                event_type: EventType::Security,
                severity: Severity::Warn,
                event_ts_ns: 1,
                body: TelemetryBody::Security(SecurityEvent::new(SecurityEventKind::SshAuthFailure)),
            }],
        };
        let codec = EnvelopeCodec::new();
        let envelope = Envelope::new(1, "k-dt", "device-1", Payload::DeviceTelemetry(telemetry)).unwrap();
        let frame = codec.encode(&envelope).unwrap();

        assert_eq!(pipeline.admit(&frame, 100).await.status, Ack::Ok);

        let (device_id, event) = rx.try_recv().unwrap();
        assert_eq!(device_id, "device-1");
        assert_eq!(event.event_id, "e1");

        let stored = store.telemetry().window("device-1", 0, u64::MAX).await.unwrap();
        assert_eq!(stored.len(), 1);
    }
}
