//! Prometheus metrics exposed at `/metrics` (§6.7). Kept to the handful
//! of series an operator actually pages on: admission throughput by
//! outcome, current in-flight count, and WAL depth.

use amoskys_core::error::CoreError;
use prometheus::{IntCounterVec, IntGauge, Opts, Registry};

pub struct BusMetrics {
    pub registry: Registry,
    pub admitted_total: IntCounterVec,
    pub inflight: IntGauge,
    pub wal_entries: IntGauge,
}

impl BusMetrics {
    pub fn new() -> Result<Self, CoreError> {
        let registry = Registry::new();

        let admitted_total = IntCounterVec::new(
            Opts::new("amoskys_bus_admitted_total", "Envelopes processed by the admission pipeline, by outcome"),
            &["outcome"],
        )
        .expect("metric descriptor is a fixed, valid literal");
        registry
            .register(Box::new(admitted_total.clone()))
            .expect("metric name is unique within this registry");

        let inflight = IntGauge::new("amoskys_bus_inflight", "Envelopes currently held by the admission gate")
            .expect("metric descriptor is a fixed, valid literal");
        registry
            .register(Box::new(inflight.clone()))
            .expect("metric name is unique within this registry");

        let wal_entries = IntGauge::new("amoskys_bus_wal_entries", "Rows currently in the write-ahead log")
            .expect("metric descriptor is a fixed, valid literal");
        registry
            .register(Box::new(wal_entries.clone()))
            .expect("metric name is unique within this registry");

        Ok(Self {
            registry,
            admitted_total,
            inflight,
            wal_entries,
        })
    }

    pub fn record_outcome(&self, outcome: &str) {
        self.admitted_total.with_label_values(&[outcome]).inc();
    }
}

impl Default for BusMetrics {
    fn default() -> Self {
        Self::new().expect("metric registration cannot fail with this fixed set of descriptors")
    }
}
