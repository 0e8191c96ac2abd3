//! The single serialization point for coherence traffic (spec §4.1, §4.2 —
//! component 3).
//!
//! The bus never stores cache handles (spec §3 "Ownership"): every
//! `broadcast` call receives the full peer set as an explicit parameter,
//! supplied by whichever orchestrator already holds a live borrow of every
//! cache (the core driver in serial mode, a scoped thread in parallel
//! mode — see `system.rs`). Its counters are guarded by a single
//! `parking_lot::Mutex` held for the full duration of a `broadcast` call,
//! including tallying any nested write-backs a snoop requires (spec §5a).

use parking_lot::Mutex;

use crate::cache::Cache;
use crate::state::{BusTxn, SnoopResponse};

#[derive(Debug, Default)]
struct BusCounters {
    traffic_blocks: u64,
    traffic_words: u64,
    invalidations_or_updates: u64,
}

pub struct Bus {
    block_size: u64,
    word_size: u64,
    counters: Mutex<BusCounters>,
}

impl Bus {
    pub fn new(block_size: u64, word_size: u64) -> Bus {
        Bus {
            block_size,
            word_size,
            counters: Mutex::new(BusCounters::default()),
        }
    }

    /// Write a dirty block back to memory (spec §4.1 `Flush`), used only
    /// for the eviction path. A snoop-driven flush is accounted inline by
    /// [`broadcast`](Bus::broadcast) instead: see §5a in `DESIGN.md` for why
    /// this call is never nested inside another `broadcast`.
    pub fn flush(&self, _addr: u32, _sender_idx: usize) {
        self.counters.lock().traffic_blocks += 1;
    }

    /// Broadcast `BusRd`/`BusRdX`/`BusUpd` to every cache in `caches` except
    /// `sender_idx`, aggregate their snoop responses, and account for
    /// traffic and invalidations/updates per spec §4.2.
    pub fn broadcast(
        &self,
        txn: BusTxn,
        addr: u32,
        sender_idx: usize,
        caches: &[Cache],
    ) -> SnoopResponse {
        assert_ne!(
            txn,
            BusTxn::Flush,
            "Flush has no snoop reaction; eviction write-backs use Bus::flush"
        );

        let mut counters = self.counters.lock();

        let mut response = SnoopResponse::NoCopy;
        let mut holders = 0u64;
        for (idx, cache) in caches.iter().enumerate() {
            if idx == sender_idx {
                continue;
            }
            let outcome = cache.snoop(addr, idx, txn);
            if outcome.response.any_copy() {
                holders += 1;
            }
            response = response.combine(outcome.response);
            if outcome.emits_flush {
                counters.traffic_blocks += 1;
            }
        }

        match txn {
            BusTxn::BusRd => {
                counters.traffic_blocks += 1;
            }
            BusTxn::BusRdX => {
                counters.traffic_blocks += 1;
                counters.invalidations_or_updates += holders;
            }
            BusTxn::BusUpd => {
                counters.traffic_words += 1 + holders;
                counters.invalidations_or_updates += holders;
            }
            BusTxn::Flush => unreachable!("excluded by the assert above"),
        }

        response
    }

    /// Total bus traffic in bytes: `traffic_blocks * block_size +
    /// traffic_words * word_size` (spec §3).
    pub fn total_traffic_bytes(&self) -> u64 {
        let c = self.counters.lock();
        c.traffic_blocks * self.block_size + c.traffic_words * self.word_size
    }

    pub fn total_invalidations_or_updates(&self) -> u64 {
        self.counters.lock().invalidations_or_updates
    }
}
