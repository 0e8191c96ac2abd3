//! Address decomposition and per-core cache orchestration (spec §4.5, §3 —
//! component 2).
//!
//! A `Cache` owns its `LruSet`s behind one `parking_lot::Mutex` each; it
//! never stores a reference to the `Bus` or to its peers. Every method that
//! needs either takes them as parameters, supplied by whoever already has a
//! live borrow of the whole system (`system.rs`). This is what lets
//! `std::thread::scope` drive the parallel mode of spec §5 without any
//! `Arc`/`Weak` bookkeeping — see `DESIGN.md`.

use parking_lot::Mutex;

use crate::bus::Bus;
use crate::cost;
use crate::error::{ConfigError, SimError};
use crate::lru_set::LruSet;
use crate::protocol::{self, ReadHitAction, SnoopOutcome, WriteHitAction};
use crate::state::{BusTxn, CacheState, Protocol};

const ADDRESS_WIDTH_BITS: u32 = 32;

/// The outcome of a single processor access, handed back to the driver.
#[derive(Clone, Copy, Debug)]
pub struct AccessOutcome {
    pub cycles: u64,
    pub hit: bool,
    pub prev_state: CacheState,
    pub new_state: CacheState,
}

pub struct Cache {
    protocol: Protocol,
    block_size: u64,
    offset_bits: u32,
    index_bits: u32,
    sets: Vec<Mutex<LruSet>>,
}

impl Cache {
    pub fn new(
        protocol: Protocol,
        cache_size_bytes: u64,
        block_size_bytes: u64,
        associativity: u64,
    ) -> Result<Cache, SimError> {
        check_power_of_two("cache_size_bytes", cache_size_bytes)?;
        check_power_of_two("associativity", associativity)?;
        check_power_of_two("block_size_bytes", block_size_bytes)?;

        let product = block_size_bytes * associativity;
        if cache_size_bytes % product != 0 {
            return Err(ConfigError::IndivisibleGeometry {
                cache_size: cache_size_bytes,
                block_size: block_size_bytes,
                associativity,
                product,
            }
            .into());
        }
        let num_sets = cache_size_bytes / product;

        let offset_bits = block_size_bytes.trailing_zeros();
        let index_bits = num_sets.trailing_zeros();
        debug_assert!(
            offset_bits + index_bits <= ADDRESS_WIDTH_BITS,
            "geometry consumes more than the {ADDRESS_WIDTH_BITS}-bit address space"
        );

        let sets = (0..num_sets)
            .map(|_| Mutex::new(LruSet::new(associativity as usize)))
            .collect();

        Ok(Cache {
            protocol,
            block_size: block_size_bytes,
            offset_bits,
            index_bits,
            sets,
        })
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn num_sets(&self) -> usize {
        self.sets.len()
    }

    /// Address decomposition (spec §3): `tag = addr >> (offset_bits +
    /// index_bits)`, `set_index = (addr >> offset_bits) & (num_sets - 1)`.
    fn decompose(&self, addr: u32) -> (u32, usize) {
        let set_index = if self.index_bits == 0 {
            0
        } else {
            (addr >> self.offset_bits) & ((1u32 << self.index_bits) - 1)
        };
        let tag = addr >> (self.offset_bits + self.index_bits);
        (tag, set_index as usize)
    }

    /// Non-mutating lookup of the state currently held for `addr`. Used by
    /// invariant checks and tests; never reorders LRU position.
    pub fn state_of(&self, addr: u32) -> CacheState {
        let (tag, set_idx) = self.decompose(addr);
        self.sets[set_idx].lock().state_of(tag)
    }

    pub fn load(&self, addr: u32, core_idx: usize, bus: &Bus, caches: &[Cache]) -> AccessOutcome {
        self.access(addr, core_idx, bus, caches, false)
    }

    pub fn store(&self, addr: u32, core_idx: usize, bus: &Bus, caches: &[Cache]) -> AccessOutcome {
        self.access(addr, core_idx, bus, caches, true)
    }

    fn access(
        &self,
        addr: u32,
        core_idx: usize,
        bus: &Bus,
        caches: &[Cache],
        is_write: bool,
    ) -> AccessOutcome {
        let (tag, set_idx) = self.decompose(addr);
        let prev_state = self.sets[set_idx].lock().state_of(tag);

        if prev_state == CacheState::NotPresent {
            return self.allocate(tag, set_idx, addr, core_idx, bus, caches, is_write);
        }

        if is_write {
            self.write_hit(tag, set_idx, prev_state, addr, core_idx, bus, caches)
        } else {
            self.read_hit(tag, set_idx, prev_state, addr, core_idx, bus, caches)
        }
    }

    fn read_hit(
        &self,
        tag: u32,
        set_idx: usize,
        prev_state: CacheState,
        addr: u32,
        core_idx: usize,
        bus: &Bus,
        caches: &[Cache],
    ) -> AccessOutcome {
        let hit = prev_state.is_hit(self.protocol);
        match protocol::read_hit(self.protocol, prev_state, core_idx, addr) {
            ReadHitAction::Resolved(new_state) => {
                self.sets[set_idx].lock().touch_mru(tag);
                AccessOutcome {
                    cycles: cost::hit_cost(),
                    hit,
                    prev_state,
                    new_state,
                }
            }
            ReadHitAction::NeedsBusRd => {
                let response = bus.broadcast(BusTxn::BusRd, addr, core_idx, caches);
                let new_state = protocol::resolve_read_refresh(self.protocol, response);
                self.sets[set_idx].lock().touch_mru_with_state(tag, new_state);
                AccessOutcome {
                    cycles: cost::miss_cost(response, self.block_size as usize, false),
                    hit,
                    prev_state,
                    new_state,
                }
            }
        }
    }

    fn write_hit(
        &self,
        tag: u32,
        set_idx: usize,
        prev_state: CacheState,
        addr: u32,
        core_idx: usize,
        bus: &Bus,
        caches: &[Cache],
    ) -> AccessOutcome {
        let hit = prev_state.is_hit(self.protocol);
        match protocol::write_hit(self.protocol, prev_state, core_idx, addr) {
            WriteHitAction::Resolved(new_state) => {
                self.sets[set_idx].lock().touch_mru_with_state(tag, new_state);
                AccessOutcome {
                    cycles: cost::hit_cost(),
                    hit,
                    prev_state,
                    new_state,
                }
            }
            WriteHitAction::NeedsBusRdX => {
                let response = bus.broadcast(BusTxn::BusRdX, addr, core_idx, caches);
                let new_state = protocol::resolve_write_miss_mesi(response);
                self.sets[set_idx].lock().touch_mru_with_state(tag, new_state);
                // Shared is a valid MESI copy, so this is a hit (spec §4.5,
                // scenario S2) even though it emits BusRdX; Invalid is not.
                let cycles = if hit {
                    cost::hit_cost()
                } else {
                    cost::miss_cost(response, self.block_size as usize, false)
                };
                AccessOutcome {
                    cycles,
                    hit,
                    prev_state,
                    new_state,
                }
            }
            WriteHitAction::NeedsBusUpd => {
                let response = bus.broadcast(BusTxn::BusUpd, addr, core_idx, caches);
                let new_state = protocol::resolve_write_update(response);
                self.sets[set_idx].lock().touch_mru_with_state(tag, new_state);
                AccessOutcome {
                    cycles: cost::dragon_write_update_cost(),
                    hit: true,
                    prev_state,
                    new_state,
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn allocate(
        &self,
        tag: u32,
        set_idx: usize,
        addr: u32,
        core_idx: usize,
        bus: &Bus,
        caches: &[Cache],
        is_write: bool,
    ) -> AccessOutcome {
        // Idempotence on hit (spec §8 property 7): allocate is only ever
        // invoked after read/write reports NotPresent, so this never fires
        // through Cache::access, but allocate's own contract must still
        // hold if called directly — a tag already present is a no-op, not
        // an eviction-and-replace.
        let already_present = self.sets[set_idx].lock().state_of(tag);
        if already_present != CacheState::NotPresent {
            return AccessOutcome {
                cycles: cost::hit_cost(),
                hit: already_present.is_hit(self.protocol),
                prev_state: already_present,
                new_state: already_present,
            };
        }

        let evicted_dirty = {
            let mut set = self.sets[set_idx].lock();
            set.evict_lru_if_full()
                .map(|line| line.state.is_dirty())
                .unwrap_or(false)
        };
        if evicted_dirty {
            bus.flush(addr, core_idx);
        }

        let (new_state, response) = match self.protocol {
            Protocol::Mesi => {
                let txn = if is_write {
                    protocol::write_miss_first_request(self.protocol)
                } else {
                    protocol::read_miss_request(self.protocol)
                };
                let response = bus.broadcast(txn, addr, core_idx, caches);
                let state = if is_write {
                    protocol::resolve_write_miss_mesi(response)
                } else {
                    protocol::resolve_read_refresh(self.protocol, response)
                };
                (state, response)
            }
            Protocol::Dragon => {
                let response = bus.broadcast(BusTxn::BusRd, addr, core_idx, caches);
                if is_write {
                    let (state, needs_upd) = protocol::resolve_write_miss_dragon(response);
                    if needs_upd {
                        bus.broadcast(BusTxn::BusUpd, addr, core_idx, caches);
                    }
                    (state, response)
                } else {
                    (protocol::resolve_read_refresh(self.protocol, response), response)
                }
            }
        };

        self.sets[set_idx]
            .lock()
            .insert_mru(tag, new_state, self.protocol, core_idx, addr);

        AccessOutcome {
            cycles: cost::miss_cost(response, self.block_size as usize, evicted_dirty),
            hit: false,
            prev_state: CacheState::NotPresent,
            new_state,
        }
    }

    /// Called by the bus on every cache except the transaction's sender
    /// (spec §4.4). Dispatches to the protocol's snoop table and applies
    /// the resulting state in place, without reordering LRU position.
    pub fn snoop(&self, addr: u32, snoop_idx: usize, txn: BusTxn) -> SnoopOutcome {
        let (tag, set_idx) = self.decompose(addr);
        let mut set = self.sets[set_idx].lock();
        let state = set.state_of(tag);
        let outcome = protocol::snoop(self.protocol, state, txn, snoop_idx, addr);
        if state != CacheState::NotPresent && outcome.next_state != state {
            set.set_state_in_place(tag, outcome.next_state);
        }
        outcome
    }
}

fn check_power_of_two(dimension: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 || value & (value - 1) != 0 {
        Err(ConfigError::NotPowerOfTwo { dimension, value })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;

    fn bus() -> Bus {
        Bus::new(16, 4)
    }

    #[test]
    fn rejects_non_power_of_two_associativity() {
        assert!(Cache::new(Protocol::Mesi, 64, 16, 3).is_err());
    }

    #[test]
    fn rejects_indivisible_geometry() {
        assert!(Cache::new(Protocol::Mesi, 48, 16, 4).is_err());
    }

    #[test]
    fn address_decomposition_matches_spec_example() {
        // block=16 (offset=4 bits), 2 sets (index=1 bit).
        let cache = Cache::new(Protocol::Mesi, 64, 16, 2).unwrap();
        let (tag0, idx0) = cache.decompose(0x0);
        let (tag1, idx1) = cache.decompose(0x40);
        let (tag2, idx2) = cache.decompose(0x80);
        assert_eq!((idx0, idx1, idx2), (0, 0, 0));
        assert_ne!(tag0, tag1);
        assert_ne!(tag1, tag2);
    }

    #[test]
    fn single_core_read_miss_then_hit() {
        let cache = Cache::new(Protocol::Mesi, 64, 16, 2).unwrap();
        let caches = [cache];
        let b = bus();

        let miss = caches[0].load(0x0, 0, &b, &caches);
        assert!(!miss.hit);
        assert_eq!(miss.new_state, CacheState::Exclusive);

        let hit = caches[0].load(0x0, 0, &b, &caches);
        assert!(hit.hit);
        assert_eq!(hit.cycles, 1);
    }

    #[test]
    fn write_miss_goes_straight_to_modified() {
        let cache = Cache::new(Protocol::Mesi, 64, 16, 2).unwrap();
        let caches = [cache];
        let b = bus();

        let outcome = caches[0].store(0x0, 0, &b, &caches);
        assert!(!outcome.hit);
        assert_eq!(outcome.new_state, CacheState::Modified);
    }

    #[test]
    fn allocate_on_an_already_present_tag_is_a_no_op() {
        // Spec §8 property 7: allocate must not evict, broadcast, or panic
        // when the tag is already present; it must return the existing
        // line untouched.
        let cache = Cache::new(Protocol::Mesi, 64, 16, 2).unwrap();
        let caches = [cache];
        let b = bus();

        let miss = caches[0].load(0x0, 0, &b, &caches);
        assert_eq!(miss.new_state, CacheState::Exclusive);

        let (tag, set_idx) = caches[0].decompose(0x0);
        let redundant = caches[0].allocate(tag, set_idx, 0x0, 0, &b, &caches, false);

        assert_eq!(redundant.new_state, CacheState::Exclusive);
        assert_eq!(redundant.prev_state, CacheState::Exclusive);
        assert_eq!(caches[0].state_of(0x0), CacheState::Exclusive);
        assert_eq!(b.total_traffic_bytes(), 16, "no new bus activity from the no-op allocate");
    }
}
