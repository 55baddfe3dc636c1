//! In-memory idempotency-key dedupe cache (§4.1 step 5). The WAL's
//! `UNIQUE` constraint is the durable backstop; this cache is what keeps
//! a retried-but-already-admitted envelope from paying a disk round trip
//! at all, which matters under the retry storms a partitioned agent
//! produces once connectivity returns.

use std::sync::Arc;

use amoskys_core::time::Clock;
use dashmap::DashMap;

pub struct DedupeCache {
    entries: DashMap<String, u64>,
    ttl_ns: u64,
    max_entries: usize,
    clock: Arc<dyn Clock>,
}

impl DedupeCache {
    pub fn new(ttl_ns: u64, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl_ns,
            max_entries,
            clock,
        }
    }

    /// Returns `true` if `key` was already present and not yet expired
    /// (a duplicate); otherwise records it and returns `false`. Expired
    /// entries are swept opportunistically on insert rather than on a
    /// background timer, which keeps this a plain synchronous call with
    /// no task of its own.
    pub fn check_and_insert(&self, key: &str) -> bool {
        let now = self.clock.now_ns();

        if let Some(entry) = self.entries.get(key) {
            if now.saturating_sub(*entry) < self.ttl_ns {
                return true;
            }
        }

        if self.entries.len() >= self.max_entries {
            self.evict_expired(now);
        }

        self.entries.insert(key.to_string(), now);
        false
    }

    fn evict_expired(&self, now: u64) {
        self.entries.retain(|_, inserted_at| now.saturating_sub(*inserted_at) < self.ttl_ns);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
