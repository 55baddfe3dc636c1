//! Overload shedding and in-flight accounting (§4.1 steps 1 and 3).
//!
//! Both are the same shape — "is there room, and if so reserve a slot" —
//! so they share one atomic counter. `OverloadMode::On`/`Off` are the
//! forced-testing knobs (§6.4); `Auto` is the behavior that actually
//! runs in production, shedding once `max_inflight` in-flight envelopes
//! are already being processed.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use amoskys_core::config::OverloadMode;

pub struct AdmissionGate {
    mode: OverloadMode,
    max_inflight: usize,
    inflight: AtomicUsize,
    /// Runtime overload flag consulted in [`OverloadMode::Auto`],
    /// independently of the in-flight count — seeded from
    /// `BusConfig::overload_flag_seed` and flippable afterwards via
    /// [`AdmissionGate::set_overloaded`] (e.g. on a config reload).
    overloaded: AtomicBool,
}

/// RAII guard releasing an in-flight slot when the envelope finishes
/// processing, successfully or not.
pub struct InflightPermit<'a> {
    gate: &'a AdmissionGate,
}

impl Drop for InflightPermit<'_> {
    fn drop(&mut self) {
        self.gate.inflight.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Why [`AdmissionGate::try_acquire_detailed`] shed a request, so the
/// caller can pick the right `reason`/`backoff_hint_ms` (§4.1 steps 1, 3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShedReason {
    /// `OverloadMode::On`, or `Auto` with the runtime overload flag set.
    Overloaded,
    /// `Auto` found `max_inflight` already reserved.
    AtCapacity,
}

impl AdmissionGate {
    pub fn new(mode: OverloadMode, max_inflight: usize, overload_flag_seed: bool) -> Self {
        Self {
            mode,
            max_inflight,
            inflight: AtomicUsize::new(0),
            overloaded: AtomicBool::new(overload_flag_seed),
        }
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    /// Whether the runtime overload flag is currently set, regardless of
    /// `mode` — exposed for metrics/diagnostics rather than admission
    /// decisions, which go through `try_acquire`.
    pub fn overloaded(&self) -> bool {
        self.overloaded.load(Ordering::Acquire)
    }

    /// Flips the runtime overload flag, e.g. from a config hot-reload.
    /// Only observed by `Auto` mode; `On`/`Off` ignore it entirely.
    pub fn set_overloaded(&self, overloaded: bool) {
        self.overloaded.store(overloaded, Ordering::Release);
    }

    /// Attempts to reserve a slot. `None` means shed: either the mode is
    /// forced `On`, the runtime overload flag is set in `Auto` mode, or
    /// `Auto` found the gate already at capacity.
    pub fn try_acquire(&self) -> Option<InflightPermit<'_>> {
        self.try_acquire_detailed().ok()
    }

    /// Same admission decision as [`AdmissionGate::try_acquire`], but on
    /// the shed path names which of the two conditions in §4.1 fired, so
    /// the caller can attach the right reason and backoff hint.
    pub fn try_acquire_detailed(&self) -> Result<InflightPermit<'_>, ShedReason> {
        if matches!(self.mode, OverloadMode::On) {
            return Err(ShedReason::Overloaded);
        }
        if matches!(self.mode, OverloadMode::Off) {
            self.inflight.fetch_add(1, Ordering::AcqRel);
            return Ok(InflightPermit { gate: self });
        }

        if self.overloaded.load(Ordering::Acquire) {
            return Err(ShedReason::Overloaded);
        }

        let mut current = self.inflight.load(Ordering::Acquire);
        loop {
            if current >= self.max_inflight {
                return Err(ShedReason::AtCapacity);
            }
            match self.inflight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(InflightPermit { gate: self }),
                Err(observed) => current = observed,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_on_always_sheds() {
        let gate = AdmissionGate::new(OverloadMode::On, 100, false);
        assert!(gate.try_acquire().is_none());
    }

    #[test]
    fn forced_off_never_sheds() {
        let gate = AdmissionGate::new(OverloadMode::Off, 0, false);
        let _permit = gate.try_acquire().unwrap();
        assert_eq!(gate.inflight(), 1);
    }

    #[test]
    fn auto_sheds_once_at_capacity() {
        let gate = AdmissionGate::new(OverloadMode::Auto, 1, false);
        let first = gate.try_acquire();
        assert!(first.is_some());
        assert!(gate.try_acquire().is_none());
        drop(first);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn auto_sheds_when_overload_flag_seeded_even_if_idle() {
        let gate = AdmissionGate::new(OverloadMode::Auto, 100, true);
        assert_eq!(gate.inflight(), 0);
        assert!(gate.try_acquire().is_none());
    }

    #[test]
    fn overload_flag_can_be_flipped_at_runtime() {
        let gate = AdmissionGate::new(OverloadMode::Auto, 100, false);
        assert!(gate.try_acquire().is_some());
        gate.set_overloaded(true);
        assert!(gate.try_acquire().is_none());
        gate.set_overloaded(false);
        assert!(gate.try_acquire().is_some());
    }

    #[test]
    fn forced_off_ignores_overload_flag() {
        let gate = AdmissionGate::new(OverloadMode::Off, 0, true);
        assert!(gate.try_acquire().is_some());
    }
}
