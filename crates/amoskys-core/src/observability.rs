//! Observability facade: a single injection point for logging, metrics,
//! and operational events, so handlers and collectors take one `Arc<dyn
//! ObservabilityFacade>` instead of three separate handles.
//!
//! # Why
//! The bus admission pipeline, the correlation engine, and the agent
//! collectors all need to emit the same three kinds of signal (a log
//! line, a counter/gauge/histogram update, an operational event worth a
//! human's attention) without hard-wiring a specific backend. Concrete
//! backends live where they're used: `amoskys-bus` wires a
//! `prometheus`-backed `MetricsProvider`, `bin/agentd` and `bin/bus-server`
//! both wire a `tracing`-backed `Logger`. This crate only publishes the
//! contract plus a `tracing`-only default good enough for tests and for
//! crates that don't want a metrics dependency at all.

use crate::Sealed;
use std::sync::Arc;

/// Structured logging capability. Deliberately narrow: call sites are
/// expected to use `tracing` macros directly for anything richer than a
/// flat key/value record; this trait exists for the handful of places
/// (rule evaluation, admission) that need to log through a trait object
/// because the concrete subscriber isn't known at that layer.
pub trait Logger: Send + Sync + 'static {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, &str)]);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Metrics capability: counters, gauges, and histograms, addressed by
/// name with an optional set of label pairs. Mirrors the Prometheus data
/// model since that's what `amoskys-bus`'s concrete implementation scrapes
/// (§6.7), but the trait itself has no Prometheus dependency.
pub trait MetricsProvider: Send + Sync + 'static {
    fn incr_counter(&self, name: &'static str, labels: &[(&str, &str)], by: u64);
    fn set_gauge(&self, name: &'static str, labels: &[(&str, &str)], value: f64);
    fn observe_histogram(&self, name: &'static str, labels: &[(&str, &str)], value: f64);
}

/// A human-facing operational event: something worth surfacing to an
/// on-call operator (e.g. "agent stopped shipping: UNAUTHORIZED"), as
/// distinct from a routine log line.
pub trait OpsEventBus: Send + Sync + 'static {
    fn publish(&self, event: OpsEvent);
}

#[derive(Clone, Debug)]
pub struct OpsEvent {
    pub severity: LogLevel,
    pub summary: String,
    pub detail: Option<String>,
}

impl OpsEvent {
    pub fn new(severity: LogLevel, summary: impl Into<String>) -> Self {
        Self {
            severity,
            summary: summary.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Unified access point for the three capabilities above, handed to
/// handlers and collectors as `Arc<dyn ObservabilityFacade>`. Sealed so
/// that only this workspace provides implementations — callers consume
/// the trait object, they don't need to implement it.
pub trait ObservabilityFacade: Send + Sync + 'static + Sealed {
    fn logger(&self) -> Arc<dyn Logger>;
    fn metrics(&self) -> Arc<dyn MetricsProvider>;
    fn ops_bus(&self) -> Arc<dyn OpsEventBus>;
}

/// `tracing`-only facade: logs go through `tracing` macros, metrics and
/// ops events are dropped. Used by tests and by any binary that hasn't
/// wired a real metrics backend yet.
#[derive(Clone, Copy, Default)]
pub struct TracingFacade;

impl Sealed for TracingFacade {}

impl ObservabilityFacade for TracingFacade {
    fn logger(&self) -> Arc<dyn Logger> {
        Arc::new(TracingLogger)
    }

    fn metrics(&self) -> Arc<dyn MetricsProvider> {
        Arc::new(NullMetrics)
    }

    fn ops_bus(&self) -> Arc<dyn OpsEventBus> {
        Arc::new(TracingOpsBus)
    }
}

struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str, fields: &[(&str, &str)]) {
        let rendered: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let rendered = rendered.join(" ");
        match level {
            LogLevel::Debug => tracing::debug!(%rendered, "{message}"),
            LogLevel::Info => tracing::info!(%rendered, "{message}"),
            LogLevel::Warn => tracing::warn!(%rendered, "{message}"),
            LogLevel::Error => tracing::error!(%rendered, "{message}"),
        }
    }
}

struct NullMetrics;

impl MetricsProvider for NullMetrics {
    fn incr_counter(&self, _name: &'static str, _labels: &[(&str, &str)], _by: u64) {}
    fn set_gauge(&self, _name: &'static str, _labels: &[(&str, &str)], _value: f64) {}
    fn observe_histogram(&self, _name: &'static str, _labels: &[(&str, &str)], _value: f64) {}
}

struct TracingOpsBus;

impl OpsEventBus for TracingOpsBus {
    fn publish(&self, event: OpsEvent) {
        match event.severity {
            LogLevel::Debug | LogLevel::Info => {
                tracing::info!(detail = ?event.detail, "{}", event.summary)
            }
            LogLevel::Warn => tracing::warn!(detail = ?event.detail, "{}", event.summary),
            LogLevel::Error => tracing::error!(detail = ?event.detail, "{}", event.summary),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracing_facade_is_usable_as_trait_object() {
        let facade: Arc<dyn ObservabilityFacade> = Arc::new(TracingFacade);
        facade.logger().log(LogLevel::Info, "hello", &[("k", "v")]);
        facade.metrics().incr_counter("x", &[], 1);
        facade.ops_bus().publish(OpsEvent::new(LogLevel::Warn, "test"));
    }
}
