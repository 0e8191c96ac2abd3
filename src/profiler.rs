//! Per-core and global statistics (spec §4.6 — component 5, plus the core
//! driver's bookkeeping).
//!
//! Each core's counters are written by exactly one thread even in parallel
//! mode, so a per-core `parking_lot::Mutex` (matching the per-set locking
//! shape `Cache` already uses) is enough; the private/shared access
//! counters are genuinely contended across cores and use atomic fetch-add,
//! per spec §5.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::cache::AccessOutcome;
use crate::state::CacheState;

#[derive(Clone, Copy, Debug, Default)]
pub struct CoreCounters {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub compute_cycles: u64,
    pub loads: u64,
    pub stores: u64,
    pub hits: u64,
    pub misses: u64,
}

pub struct Profiler {
    per_core: Vec<Mutex<CoreCounters>>,
    private_accesses: AtomicU64,
    shared_accesses: AtomicU64,
}

impl Profiler {
    pub fn new(num_cores: usize) -> Profiler {
        Profiler {
            per_core: (0..num_cores).map(|_| Mutex::new(CoreCounters::default())).collect(),
            private_accesses: AtomicU64::new(0),
            shared_accesses: AtomicU64::new(0),
        }
    }

    pub fn num_cores(&self) -> usize {
        self.per_core.len()
    }

    pub fn core(&self, idx: usize) -> CoreCounters {
        *self.per_core[idx].lock()
    }

    pub fn record_load(&self, core_idx: usize, outcome: AccessOutcome) {
        self.record_access(core_idx, outcome, true);
    }

    pub fn record_store(&self, core_idx: usize, outcome: AccessOutcome) {
        self.record_access(core_idx, outcome, false);
    }

    fn record_access(&self, core_idx: usize, outcome: AccessOutcome, is_load: bool) {
        {
            let mut c = self.per_core[core_idx].lock();
            c.cycles += outcome.cycles;
            c.idle_cycles += outcome.cycles;
            if is_load {
                c.loads += 1;
            } else {
                c.stores += 1;
            }
            if outcome.hit {
                c.hits += 1;
            } else {
                c.misses += 1;
            }
        }
        self.classify(outcome.new_state);
    }

    /// `Compute` touches only `cycles` and `compute_cycles` — never
    /// `loads`/`stores`/`hits`/`misses` (spec §4.6, §9c).
    pub fn record_compute(&self, core_idx: usize, cycles: u64) {
        let mut c = self.per_core[core_idx].lock();
        c.cycles += cycles;
        c.compute_cycles += cycles;
    }

    fn classify(&self, state: CacheState) {
        if state.is_private() {
            self.private_accesses.fetch_add(1, Ordering::Relaxed);
        } else if state.is_shared() {
            self.shared_accesses.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn private_accesses(&self) -> u64 {
        self.private_accesses.load(Ordering::Relaxed)
    }

    pub fn shared_accesses(&self) -> u64 {
        self.shared_accesses.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::CacheState;

    fn outcome(cycles: u64, hit: bool, new_state: CacheState) -> AccessOutcome {
        AccessOutcome {
            cycles,
            hit,
            prev_state: CacheState::NotPresent,
            new_state,
        }
    }

    #[test]
    fn compute_never_touches_load_store_hit_miss_counters() {
        let p = Profiler::new(1);
        p.record_compute(0, 10);
        let c = p.core(0);
        assert_eq!(c.compute_cycles, 10);
        assert_eq!(c.cycles, 10);
        assert_eq!(c.idle_cycles, 0);
        assert_eq!(c.loads, 0);
        assert_eq!(c.stores, 0);
        assert_eq!(c.hits, 0);
        assert_eq!(c.misses, 0);
    }

    #[test]
    fn load_hit_increments_hits_and_idle_cycles() {
        let p = Profiler::new(1);
        p.record_load(0, outcome(1, true, CacheState::Exclusive));
        let c = p.core(0);
        assert_eq!(c.loads, 1);
        assert_eq!(c.hits, 1);
        assert_eq!(c.idle_cycles, 1);
        assert_eq!(c.cycles, 1);
    }

    #[test]
    fn private_and_shared_classification() {
        let p = Profiler::new(1);
        p.record_load(0, outcome(1, true, CacheState::Exclusive));
        p.record_load(0, outcome(1, true, CacheState::Shared));
        assert_eq!(p.private_accesses(), 1);
        assert_eq!(p.shared_accesses(), 1);
    }

    #[test]
    fn invalid_and_not_present_are_neither_private_nor_shared() {
        let p = Profiler::new(1);
        p.record_store(0, outcome(1, false, CacheState::Invalid));
        assert_eq!(p.private_accesses(), 0);
        assert_eq!(p.shared_accesses(), 0);
    }
}
