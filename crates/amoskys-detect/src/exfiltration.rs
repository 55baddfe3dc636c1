//! Exfiltration-spike heuristics (§4.5): an outbound transfer far larger
//! than a device's recent baseline, sustained long enough to not just be
//! a one-off legitimate upload.

pub struct ExfiltrationMatch {
    pub bytes_out: u64,
    pub baseline_bytes_out: u64,
    pub multiple_of_baseline: f64,
}

pub const MITRE_TECHNIQUE: &str = "T1041";

/// Flags `bytes_out` as a spike when it exceeds `multiplier` times the
/// device's `baseline_bytes_out` (a trailing median or mean the caller
/// maintains) and clears a floor so a baseline of a few bytes doesn't
/// make everything look like a spike.
pub fn evaluate(
    bytes_out: u64,
    baseline_bytes_out: u64,
    multiplier: f64,
    floor_bytes: u64,
) -> Option<ExfiltrationMatch> {
    if bytes_out < floor_bytes {
        return None;
    }
    let threshold = (baseline_bytes_out as f64 * multiplier).max(floor_bytes as f64);
    if (bytes_out as f64) < threshold {
        return None;
    }
    let multiple_of_baseline = if baseline_bytes_out == 0 {
        f64::INFINITY
    } else {
        bytes_out as f64 / baseline_bytes_out as f64
    };
    Some(ExfiltrationMatch {
        bytes_out,
        baseline_bytes_out,
        multiple_of_baseline,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_large_multiple_of_baseline() {
        let m = evaluate(10_000_000, 100_000, 10.0, 1_000_000).unwrap();
        assert!(m.multiple_of_baseline >= 10.0);
    }

    #[test]
    fn does_not_flag_below_floor() {
        assert!(evaluate(500, 10, 10.0, 1_000_000).is_none());
    }

    #[test]
    fn does_not_flag_ordinary_traffic_above_floor() {
        assert!(evaluate(1_500_000, 1_000_000, 10.0, 1_000_000).is_none());
    }
}
