//! Command-and-control heuristics (§4.5): combines beaconing regularity
//! with destination-port anomaly, since either alone is noisy (cron jobs
//! beacon too; plenty of traffic hits uncommon ports).

use crate::beaconing::{intervals_from_timestamps, looks_like_beaconing};

/// Ports that see no legitimate outbound traffic from an endpoint in
/// typical deployments but appear constantly in C2 frameworks' default
/// configuration (Cobalt Strike, Metasploit, sliver).
const SUSPICIOUS_C2_PORTS: &[u16] = &[4444, 4445, 8080, 8443, 50050, 53281];

pub struct C2Match {
    pub reason: &'static str,
}

pub const MITRE_TECHNIQUE: &str = "T1071";

/// `connect_timestamps_ns` must be sorted ascending and belong to
/// outbound flows from the same device to the same `dst_port`.
pub fn evaluate(dst_port: u16, connect_timestamps_ns: &[u64]) -> Option<C2Match> {
    let beaconing = {
        let intervals = intervals_from_timestamps(connect_timestamps_ns);
        intervals.len() >= 3 && looks_like_beaconing(&intervals)
    };
    let suspicious_port = SUSPICIOUS_C2_PORTS.contains(&dst_port);

    match (beaconing, suspicious_port) {
        (true, true) => Some(C2Match {
            reason: "regular-interval-to-known-c2-port",
        }),
        (true, false) => Some(C2Match {
            reason: "regular-interval-beaconing",
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_regular_beacon_to_known_port() {
        let timestamps: Vec<u64> = (0..6).map(|i| i * 60_000_000_000).collect();
        let m = evaluate(4444, &timestamps).unwrap();
        assert_eq!(m.reason, "regular-interval-to-known-c2-port");
    }

    #[test]
    fn does_not_flag_irregular_traffic_on_ordinary_port() {
        let timestamps = vec![0, 5_000_000_000, 400_000_000_000, 410_000_000_000];
        assert!(evaluate(443, &timestamps).is_none());
    }

    #[test]
    fn does_not_flag_too_few_samples() {
        let timestamps = vec![0, 60_000_000_000];
        assert!(evaluate(4444, &timestamps).is_none());
    }
}
