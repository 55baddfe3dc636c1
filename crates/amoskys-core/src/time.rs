//! Injectable clock, so that dedupe TTL expiry, window eviction, and retry
//! jitter can be exercised deterministically in tests instead of racing a
//! real wall clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time. Implementations must be monotonic enough for
/// TTL/window arithmetic; they are not required to be monotonic across a
/// system clock adjustment (the production implementation is not).
pub trait Clock: Send + Sync + 'static {
    /// Nanoseconds since the Unix epoch, matching the wire representation
    /// of `ts_ns` in `amoskys-envelope`.
    fn now_ns(&self) -> u64;

    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_ns())
    }
}

/// Production clock backed by [`SystemTime::now`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ns(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }
}

/// Test clock with an explicit, atomically-settable value. Starts at a
/// fixed epoch offset rather than 0 so that `ts_ns > 0` invariants hold by
/// default without every test having to set the clock first.
#[derive(Debug)]
pub struct MockClock {
    now_ns: AtomicU64,
}

impl Default for MockClock {
    fn default() -> Self {
        Self {
            now_ns: AtomicU64::new(1_700_000_000_000_000_000),
        }
    }
}

impl MockClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now_ns.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, ns: u64) {
        self.now_ns.store(ns, Ordering::SeqCst);
    }
}

impl Clock for MockClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances() {
        let clock = MockClock::default();
        let start = clock.now_ns();
        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now_ns(), start + 5_000_000_000);
    }

    #[test]
    fn system_clock_is_nonzero() {
        assert!(SystemClock.now_ns() > 0);
    }
}
