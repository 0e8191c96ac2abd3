//! One set of a set-associative cache: a bounded, MRU-ordered collection of
//! `(tag, state)` lines (spec §3, §4.3, §4.4 — component 1).
//!
//! This is pure data and pure reordering logic. It knows nothing about the
//! bus or locking; `Cache` (see `cache.rs`) owns a `Mutex` per `LruSet` and
//! is responsible for deciding when to call which method and when to go
//! talk to the bus in between. Associativities in realistic geometries are
//! small (2-16 lines), so a flat `Vec` with linear scan-and-move-to-front
//! is both simpler and faster here than a linked list plus a tag->position
//! map — see `DESIGN.md`.

use crate::state::{CacheState, Protocol};

/// A single cache line: a block's slot, tagged and stateful. No data
/// payload — this simulator never models memory contents (spec §1).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CacheLine {
    pub tag: u32,
    pub state: CacheState,
}

/// A bounded, MRU-ordered collection of cache lines. Index 0 is MRU; the
/// last index is LRU.
#[derive(Debug)]
pub struct LruSet {
    lines: Vec<CacheLine>,
    capacity: usize,
}

impl LruSet {
    pub fn new(capacity: usize) -> LruSet {
        assert!(capacity > 0, "associativity must be at least 1");
        LruSet {
            lines: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_full(&self) -> bool {
        self.lines.len() >= self.capacity
    }

    fn position(&self, tag: u32) -> Option<usize> {
        self.lines.iter().position(|line| line.tag == tag)
    }

    /// The state of the line with this tag, or `NotPresent` if no such line
    /// exists in the set. Does not reorder.
    pub fn state_of(&self, tag: u32) -> CacheState {
        self.position(tag)
            .map(|i| self.lines[i].state)
            .unwrap_or(CacheState::NotPresent)
    }

    /// Overwrite the state of an existing line without reordering it. Used
    /// by snoop reactions, which change state but must not affect LRU
    /// position (spec §3, §4.4).
    ///
    /// Panics if no line with this tag exists — callers must check
    /// presence first via [`state_of`](LruSet::state_of).
    pub fn set_state_in_place(&mut self, tag: u32, state: CacheState) {
        let i = self
            .position(tag)
            .expect("set_state_in_place called with an absent tag");
        self.lines[i].state = state;
    }

    /// Move the line with this tag to MRU position, leaving its state
    /// unchanged. Panics if absent.
    pub fn touch_mru(&mut self, tag: u32) {
        let i = self
            .position(tag)
            .expect("touch_mru called with an absent tag");
        let line = self.lines.remove(i);
        self.lines.insert(0, line);
    }

    /// Move the line with this tag to MRU position and set its state in
    /// one step (the common case for processor hits). Panics if absent.
    pub fn touch_mru_with_state(&mut self, tag: u32, state: CacheState) {
        let i = self
            .position(tag)
            .expect("touch_mru_with_state called with an absent tag");
        let mut line = self.lines.remove(i);
        line.state = state;
        self.lines.insert(0, line);
    }

    /// Evict the LRU line (if the set is at capacity) and return it. Does
    /// nothing and returns `None` if the set is not full.
    pub fn evict_lru_if_full(&mut self) -> Option<CacheLine> {
        if self.is_full() {
            self.lines.pop()
        } else {
            None
        }
    }

    /// Insert a brand-new line at MRU position. Callers (`Cache::allocate`)
    /// are expected to have already handled the tag-already-present case as
    /// an idempotent no-op (spec §8 property 7) before ever reaching here,
    /// so a duplicate tag at this point is an invariant violation, not a
    /// normal outcome: it panics with a diagnostic naming the core, address,
    /// and protocol involved (spec §7.4), instead of silently overwriting or
    /// duplicating the line.
    ///
    /// Also panics if the set is already full (callers must evict first via
    /// [`evict_lru_if_full`](LruSet::evict_lru_if_full)).
    pub fn insert_mru(
        &mut self,
        tag: u32,
        state: CacheState,
        protocol: Protocol,
        core_idx: usize,
        addr: u32,
    ) {
        assert!(
            self.position(tag).is_none(),
            "invariant violation: duplicate tag inserted into LRU set \
             (core {}, addr {:#010x}, protocol {}, state {:?})",
            core_idx, addr, protocol, state
        );
        assert!(
            self.lines.len() < self.capacity,
            "invariant violation: insert_mru called on a full set \
             (core {}, addr {:#010x}, protocol {})",
            core_idx, addr, protocol
        );
        self.lines.insert(0, CacheLine { tag, state });
    }

    /// Iterate over the lines currently held, MRU first. Used for
    /// cross-cache invariant checks in integration tests.
    pub fn lines(&self) -> impl Iterator<Item = &CacheLine> {
        self.lines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_tag_is_not_present() {
        let set = LruSet::new(2);
        assert_eq!(set.state_of(0x42), CacheState::NotPresent);
    }

    #[test]
    fn insert_then_lookup() {
        let mut set = LruSet::new(2);
        set.insert_mru(0x1, CacheState::Exclusive, Protocol::Mesi, 0, 0x1000);
        assert_eq!(set.state_of(0x1), CacheState::Exclusive);
    }

    #[test]
    fn touch_mru_reorders() {
        let mut set = LruSet::new(2);
        set.insert_mru(0x1, CacheState::Shared, Protocol::Mesi, 0, 0x1000);
        set.insert_mru(0x2, CacheState::Shared, Protocol::Mesi, 0, 0x2000);
        // 0x2 is MRU, 0x1 is LRU.
        set.touch_mru(0x1);
        let tags: Vec<u32> = set.lines().map(|l| l.tag).collect();
        assert_eq!(tags, vec![0x1, 0x2]);
    }

    #[test]
    fn set_state_in_place_does_not_reorder() {
        let mut set = LruSet::new(2);
        set.insert_mru(0x1, CacheState::Modified, Protocol::Mesi, 0, 0x1000);
        set.insert_mru(0x2, CacheState::Shared, Protocol::Mesi, 0, 0x2000);
        // 0x1 is LRU at this point.
        set.set_state_in_place(0x1, CacheState::Invalid);
        let tags: Vec<u32> = set.lines().map(|l| l.tag).collect();
        assert_eq!(tags, vec![0x2, 0x1]);
        assert_eq!(set.state_of(0x1), CacheState::Invalid);
    }

    #[test]
    fn eviction_removes_the_lru_line() {
        let mut set = LruSet::new(2);
        set.insert_mru(0x1, CacheState::Shared, Protocol::Mesi, 0, 0x1000);
        set.insert_mru(0x2, CacheState::Shared, Protocol::Mesi, 0, 0x2000);
        // 0x1 is LRU.
        let evicted = set.evict_lru_if_full().expect("set is full");
        assert_eq!(evicted.tag, 0x1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn evict_is_noop_when_not_full() {
        let mut set = LruSet::new(2);
        set.insert_mru(0x1, CacheState::Shared, Protocol::Mesi, 0, 0x1000);
        assert!(set.evict_lru_if_full().is_none());
    }

    #[test]
    #[should_panic(expected = "duplicate tag")]
    fn duplicate_tag_panics() {
        let mut set = LruSet::new(2);
        set.insert_mru(0x1, CacheState::Shared, Protocol::Mesi, 0, 0x1000);
        set.insert_mru(0x1, CacheState::Exclusive, Protocol::Mesi, 0, 0x1000);
    }

    #[test]
    fn capacity_is_never_exceeded_across_insert_evict_cycles() {
        let mut set = LruSet::new(2);
        for tag in 0..10u32 {
            if let Some(_evicted) = set.evict_lru_if_full() {
                // simulate the allocate() contract: evict before insert.
            }
            set.insert_mru(tag, CacheState::Shared, Protocol::Mesi, 0, tag);
            assert!(set.len() <= set.capacity());
        }
    }
}
