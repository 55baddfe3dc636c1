//! Packet-level flow statistics (§4.5 supplement): dispersion of packet
//! sizes and inter-arrival times within a flow, the same signals the
//! beaconing and exfiltration heuristics build on but computed directly
//! off the packet stream rather than one flow-level aggregate. Useful to
//! a caller that already has per-packet samples (e.g. a pcap-backed
//! collector) and wants a feature vector without pulling in a
//! fingerprinting or scoring model — neither of which belongs here, see
//! module-level Non-goals below.
//!
//! Deliberately NOT provided: device/OS/application fingerprinting
//! (signature-database matching against known port/protocol profiles)
//! and a learned anomaly/threat score. Both need a maintained signature
//! or model corpus or external feedback loop; shipping them here.

/// Minimum, maximum, mean, and population standard deviation of a
/// sample. `None` when `samples` is empty.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Dispersion {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

fn dispersion(samples: &[f64]) -> Option<Dispersion> {
    if samples.is_empty() {
        return None;
    }
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    let (mut min, mut max) = (samples[0], samples[0]);
    for &s in samples {
        if s < min {
            min = s;
        }
        if s > max {
            max = s;
        }
    }
    Some(Dispersion {
        min,
        max,
        mean,
        std_dev: variance.sqrt(),
    })
}

/// Packet-size and timing statistics for one flow's packet stream.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowStats {
    pub packet_count: usize,
    pub byte_count: u64,
    pub packet_size: Dispersion,
    /// `None` when fewer than 2 packets, same convention as
    /// [`crate::beaconing::coefficient_of_variation`].
    pub inter_arrival: Option<Dispersion>,
    pub packets_per_second: f64,
    pub bytes_per_second: f64,
}

/// Computes [`FlowStats`] from a flow's packet sizes (bytes) and
/// matching absolute timestamps (nanoseconds, same length, ascending).
/// Returns `None` for an empty packet list.
pub fn compute(packet_sizes_bytes: &[u32], timestamps_ns: &[u64]) -> Option<FlowStats> {
    if packet_sizes_bytes.is_empty() {
        return None;
    }
    let sizes_f64: Vec<f64> = packet_sizes_bytes.iter().map(|&s| s as f64).collect();
    let packet_size = dispersion(&sizes_f64)?;
    let byte_count: u64 = packet_sizes_bytes.iter().map(|&s| s as u64).sum();

    let intervals = crate::beaconing::intervals_from_timestamps(timestamps_ns);
    let interval_f64: Vec<f64> = intervals.iter().map(|&i| i as f64).collect();
    let inter_arrival = dispersion(&interval_f64);

    let duration_ns = timestamps_ns
        .last()
        .zip(timestamps_ns.first())
        .map(|(last, first)| last.saturating_sub(*first))
        .unwrap_or(0);
    let duration_s = (duration_ns as f64 / 1_000_000_000.0).max(f64::EPSILON);

    Some(FlowStats {
        packet_count: packet_sizes_bytes.len(),
        byte_count,
        packet_size,
        inter_arrival,
        packets_per_second: packet_sizes_bytes.len() as f64 / duration_s,
        bytes_per_second: byte_count as f64 / duration_s,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_packets_have_zero_size_stddev() {
        let sizes = [128, 128, 128, 128];
        let ts = [0, 1_000_000_000, 2_000_000_000, 3_000_000_000];
        let stats = compute(&sizes, &ts).unwrap();
        assert_eq!(stats.packet_size.std_dev, 0.0);
        assert_eq!(stats.packet_size.mean, 128.0);
        assert_eq!(stats.byte_count, 512);
    }

    #[test]
    fn mixed_packet_sizes_report_min_max_mean() {
        let sizes = [64, 1500, 512];
        let ts = [0, 500_000_000, 1_000_000_000];
        let stats = compute(&sizes, &ts).unwrap();
        assert_eq!(stats.packet_size.min, 64.0);
        assert_eq!(stats.packet_size.max, 1500.0);
        assert!((stats.packet_size.mean - 692.0).abs() < 0.01);
    }

    #[test]
    fn single_packet_has_no_inter_arrival_stats() {
        let stats = compute(&[64], &[42]).unwrap();
        assert_eq!(stats.inter_arrival, None);
    }

    #[test]
    fn empty_packet_list_yields_none() {
        assert_eq!(compute(&[], &[]), None);
    }

    #[test]
    fn rates_scale_with_flow_duration() {
        let sizes = [1000; 10];
        let ts: Vec<u64> = (0..10).map(|i| i * 1_000_000_000).collect();
        let stats = compute(&sizes, &ts).unwrap();
        assert!((stats.bytes_per_second - 1000.0).abs() < 0.5);
        assert!((stats.packets_per_second - 1.0).abs() < 0.01);
    }
}
