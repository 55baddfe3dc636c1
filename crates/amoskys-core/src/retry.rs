//! Exponential backoff with deterministic jitter, shared by the agent
//! shipper (§4.2: "exponential backoff against RETRY... jittered by
//! ±20%") and by anything else in the workspace that needs to space out
//! repeated attempts without a collective thundering herd.
//!
//! The jitter is a deterministic pseudo-random function of a caller-
//! supplied seed rather than drawing from `rand`: callers that want
//! reproducible backoff sequences in tests (and the beaconing-detector
//! determinism invariant in `amoskys-detect` leans on the same mixing
//! function) get that for free, and production callers just seed from
//! something that changes every call (the current attempt count XORed
//! with a timestamp is enough).

use std::time::Duration;

/// Multiply `base` by a deterministic jitter factor in `[1 - pct, 1 + pct]`.
pub fn jitter(base: Duration, pct: f64, seed: u64) -> Duration {
    debug_assert!((0.0..=1.0).contains(&pct));
    let mixed = mix64(seed);
    // Top 53 bits of the mix give a uniform-enough float in [0, 1).
    let unit = (mixed >> 11) as f64 / (1u64 << 53) as f64;
    let factor = 1.0 + (unit * 2.0 - 1.0) * pct;
    Duration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
}

/// SplitMix64 finalizer: a cheap, well-distributed integer hash, used here
/// purely to turn a small-entropy seed into jitter that doesn't correlate
/// across consecutive attempts.
#[inline]
fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D049BB133111EB);
    x ^ (x >> 31)
}

/// Stateful exponential backoff sequence: each call to [`next`](Self::next)
/// doubles the previous delay (capped at `max`) and applies ±20% jitter.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
    jitter_pct: f64,
}

impl ExponentialBackoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base,
            max: Duration::from_secs(300),
            attempt: 0,
            jitter_pct: 0.20,
        }
    }

    pub fn with_max(mut self, max: Duration) -> Self {
        self.max = max;
        self
    }

    pub fn with_jitter_pct(mut self, pct: f64) -> Self {
        self.jitter_pct = pct;
        self
    }

    /// Advance the sequence and return the next (jittered) delay. `seed`
    /// should vary per call (e.g. derived from the envelope's idempotency
    /// key plus the attempt count) so retries of different envelopes don't
    /// land in lockstep.
    pub fn next(&mut self, seed: u64) -> Duration {
        let unjittered = self
            .base
            .checked_mul(1u32.checked_shl(self.attempt.min(20)).unwrap_or(u32::MAX))
            .unwrap_or(self.max)
            .min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        jitter(unjittered, self.jitter_pct, seed ^ u64::from(self.attempt))
    }

    /// Reset after a successful publish, so the next failure starts back
    /// at `base` rather than continuing to escalate.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jitter_stays_within_bounds() {
        let base = Duration::from_millis(1000);
        for seed in 0u64..50 {
            let d = jitter(base, 0.20, seed);
            assert!(d.as_millis() >= 800 && d.as_millis() <= 1200, "{d:?}");
        }
    }

    #[test]
    fn jitter_is_deterministic() {
        let base = Duration::from_millis(1000);
        assert_eq!(jitter(base, 0.2, 42), jitter(base, 0.2, 42));
    }

    #[test]
    fn backoff_grows_and_caps() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(100))
            .with_max(Duration::from_secs(1))
            .with_jitter_pct(0.0);
        let d1 = backoff.next(1);
        let d2 = backoff.next(2);
        let d3 = backoff.next(3);
        assert!(d1 < d2 && d2 < d3);
        for _ in 0..10 {
            backoff.next(7);
        }
        assert!(backoff.next(7) <= Duration::from_secs(1));
    }

    #[test]
    fn reset_restarts_sequence() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100)).with_jitter_pct(0.0);
        backoff.next(1);
        backoff.next(1);
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
    }
}
