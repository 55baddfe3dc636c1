//! DNS-query collector (§4.5 composition: the entropy/DGA and beaconing
//! primitives applied to hostname resolution traffic).
//!
//! Query capture is deployment-specific — a packet capture library, an
//! nsswitch hook, a resolver's own query log — so this module separates
//! "where queries come from" from "what we do with them": a concrete
//! [`DnsQuerySource`] is supplied by the binary for its target platform;
//! deployments without a capture mechanism wired up fall back to
//! [`NullDnsQuerySource`], which simply yields nothing this cycle rather
//! than failing the collector.

use std::collections::HashMap;
use std::sync::Arc;

use amoskys_core::time::Clock;
use amoskys_detect::beaconing::{intervals_from_timestamps, looks_like_beaconing};
use amoskys_detect::entropy::shannon_entropy;
use amoskys_envelope::{
    AttackPhase, EventType, SecurityEvent, SecurityEventKind, Severity, TelemetryBody, TelemetryEvent, ThreatIndicator,
};

/// §4.5: above this, a queried label's entropy alone is suggestive of
/// DGA-generated output rather than a hand-picked hostname.
const DGA_ENTROPY_THRESHOLD: f64 = 3.5;

/// Minimum resolutions to the same destination before a beaconing check
/// is meaningful (mirrors the correlation rules' evidence floors).
const MIN_BEACONING_SAMPLES: usize = 5;

/// One observed resolution: `queried_name` resolved at `ts_ns`.
#[derive(Clone, Debug)]
pub struct DnsQuery {
    pub queried_name: String,
    pub resolved_addr: String,
    pub ts_ns: u64,
}

pub trait DnsQuerySource: Send + Sync {
    /// Returns, and clears, whatever queries have been observed since
    /// the last call.
    fn drain_recent(&self) -> Vec<DnsQuery>;
}

#[derive(Default)]
pub struct NullDnsQuerySource;

impl DnsQuerySource for NullDnsQuerySource {
    fn drain_recent(&self) -> Vec<DnsQuery> {
        Vec::new()
    }
}

pub struct DnsCollector {
    source: Box<dyn DnsQuerySource>,
    clock: Arc<dyn Clock>,
}

impl DnsCollector {
    pub fn new(source: Box<dyn DnsQuerySource>, clock: Arc<dyn Clock>) -> Self {
        Self { source, clock }
    }

    pub fn collect(&self) -> Vec<TelemetryEvent> {
        let queries = self.source.drain_recent();
        let mut events: Vec<TelemetryEvent> = queries.iter().filter_map(|q| self.dga_event(q)).collect();
        events.extend(self.beaconing_events(&queries));
        events
    }

    fn dga_event(&self, query: &DnsQuery) -> Option<TelemetryEvent> {
        let label = query.queried_name.split('.').next().unwrap_or(&query.queried_name);
        let entropy = shannon_entropy(label.as_bytes());
        if entropy <= DGA_ENTROPY_THRESHOLD {
            return None;
        }

        let digit_ratio = ratio_digits(label);
        let confidence = (entropy / 8.0 + digit_ratio * 0.3).min(1.0);
        let indicator = ThreatIndicator::new(
            "dga_suspected",
            query.queried_name.clone(),
            confidence,
            AttackPhase::CommandAndControl,
            "dns_entropy",
            query.ts_ns,
        )
        .with_description(format!("label entropy {entropy:.2} bits/char"));

        Some(security_event(query, vec![indicator]))
    }

    fn beaconing_events(&self, queries: &[DnsQuery]) -> Vec<TelemetryEvent> {
        let mut by_addr: HashMap<&str, Vec<&DnsQuery>> = HashMap::new();
        for query in queries {
            by_addr.entry(query.resolved_addr.as_str()).or_default().push(query);
        }

        by_addr
            .into_values()
            .filter(|group| group.len() >= MIN_BEACONING_SAMPLES)
            .filter_map(|mut group| {
                group.sort_by_key(|q| q.ts_ns);
                let timestamps: Vec<u64> = group.iter().map(|q| q.ts_ns).collect();
                let intervals = intervals_from_timestamps(&timestamps);
                if !looks_like_beaconing(&intervals) {
                    return None;
                }
                let last = group.last().expect("group.len() >= MIN_BEACONING_SAMPLES");
                let indicator = ThreatIndicator::new(
                    "beaconing",
                    last.resolved_addr.clone(),
                    0.85,
                    AttackPhase::CommandAndControl,
                    "dns_beaconing",
                    self.clock.now_ns(),
                )
                .with_description(format!("{} regular-interval resolutions", group.len()));
                Some(security_event(last, vec![indicator]))
            })
            .collect()
    }
}

fn security_event(query: &DnsQuery, indicators: Vec<ThreatIndicator>) -> TelemetryEvent {
    TelemetryEvent {
        event_id: format!("dns-{}-{}", query.resolved_addr, query.ts_ns),
        event_type: EventType::Security,
        severity: Severity::Warn,
        event_ts_ns: query.ts_ns,
        body: TelemetryBody::Security(
            SecurityEvent::new(SecurityEventKind::Generic)
                .with_remote_addr(query.resolved_addr.clone())
                .with_indicators(indicators),
        ),
    }
}

fn ratio_digits(label: &str) -> f64 {
    if label.is_empty() {
        return 0.0;
    }
    let digits = label.chars().filter(|c| c.is_ascii_digit()).count();
    digits as f64 / label.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use amoskys_core::time::MockClock;

    struct FixedSource(Vec<DnsQuery>);

    impl DnsQuerySource for FixedSource {
        fn drain_recent(&self) -> Vec<DnsQuery> {
            self.0.clone()
        }
    }

    #[test]
    fn high_entropy_label_is_flagged() {
        let queries = vec![DnsQuery {
            queried_name: "kq3x9z7vbqpz1m.example.com".into(),
            resolved_addr: "203.0.113.4".into(),
            ts_ns: 1,
        }];
        let collector = DnsCollector::new(Box::new(FixedSource(queries)), Arc::new(MockClock::default()));
        let events = collector.collect();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn ordinary_hostname_is_not_flagged() {
        let queries = vec![DnsQuery {
            queried_name: "www.example.com".into(),
            resolved_addr: "203.0.113.4".into(),
            ts_ns: 1,
        }];
        let collector = DnsCollector::new(Box::new(FixedSource(queries)), Arc::new(MockClock::default()));
        assert!(collector.collect().is_empty());
    }

    #[test]
    fn regular_interval_resolutions_are_flagged_as_beaconing() {
        let queries: Vec<DnsQuery> = (0..10)
            .map(|i| DnsQuery {
                queried_name: "cdn.example.com".into(),
                resolved_addr: "198.51.100.5".into(),
                ts_ns: 1 + i * 60_000_000_000,
            })
            .collect();
        let collector = DnsCollector::new(Box::new(FixedSource(queries)), Arc::new(MockClock::default()));
        let events = collector.collect();
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn null_source_yields_nothing() {
        let collector = DnsCollector::new(Box::new(NullDnsQuerySource), Arc::new(MockClock::default()));
        assert!(collector.collect().is_empty());
    }
}
