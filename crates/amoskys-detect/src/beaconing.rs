//! Beaconing detection via the coefficient of variation of inter-flow
//! intervals (§4.5). A C2 implant calling home on a fixed timer produces
//! nearly-constant intervals — low CoV — where ordinary interactive or
//! bursty traffic doesn't.

/// Coefficient of variation (stddev / mean) of a sequence of inter-event
/// gaps, in nanoseconds. Returns `None` when there are fewer than two
/// gaps to compare (need at least 3 timestamps) or the mean is zero.
pub fn coefficient_of_variation(intervals_ns: &[u64]) -> Option<f64> {
    if intervals_ns.len() < 2 {
        return None;
    }
    let n = intervals_ns.len() as f64;
    let mean = intervals_ns.iter().sum::<u64>() as f64 / n;
    if mean == 0.0 {
        return None;
    }
    let variance = intervals_ns
        .iter()
        .map(|&x| {
            let diff = x as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n;
    Some(variance.sqrt() / mean)
}

/// Below this CoV, a flow's timing is regular enough to flag as
/// candidate beaconing (requires enough samples to be meaningful —
/// callers should also gate on a minimum sample count).
pub const BEACONING_COV_THRESHOLD: f64 = 0.15;

pub fn looks_like_beaconing(intervals_ns: &[u64]) -> bool {
    match coefficient_of_variation(intervals_ns) {
        Some(cov) => cov <= BEACONING_COV_THRESHOLD,
        None => false,
    }
}

/// Converts a sorted sequence of absolute event timestamps into the
/// inter-event intervals `coefficient_of_variation` expects.
pub fn intervals_from_timestamps(timestamps_ns: &[u64]) -> Vec<u64> {
    timestamps_ns
        .windows(2)
        .map(|pair| pair[1].saturating_sub(pair[0]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfectly_regular_intervals_have_zero_cov() {
        let intervals = vec![60_000_000_000; 10];
        assert_eq!(coefficient_of_variation(&intervals), Some(0.0));
        assert!(looks_like_beaconing(&intervals));
    }

    #[test]
    fn highly_irregular_intervals_are_not_beaconing() {
        let intervals = vec![1_000, 90_000_000_000, 5_000, 120_000_000_000];
        assert!(!looks_like_beaconing(&intervals));
    }

    #[test]
    fn too_few_samples_yields_none() {
        assert_eq!(coefficient_of_variation(&[1]), None);
        assert_eq!(coefficient_of_variation(&[]), None);
    }

    #[test]
    fn intervals_from_timestamps_computes_gaps() {
        assert_eq!(intervals_from_timestamps(&[10, 25, 50]), vec![15, 25]);
    }
}
