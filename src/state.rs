//! Coherence states, bus transactions, and snoop responses shared by both
//! protocols.
//!
//! A single [`CacheState`] spans both MESI and Dragon rather than two
//! separate per-protocol enums wrapped in a trait. [`Protocol::assert_owns`]
//! is the one place that would need to change if a state ever leaked from
//! one protocol's cache into the other's; see `DESIGN.md` for why that one
//! assertion was judged cheaper than threading a type parameter through
//! every method on `Cache` and `LruSet`.

use std::fmt;

/// Which coherence protocol a cache was built for.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Protocol {
    Mesi,
    Dragon,
}

impl Protocol {
    /// Parse a protocol name the way the CLI does: exact match on `"Dragon"`,
    /// anything else (including `"MESI"`) is MESI.
    pub fn parse(name: &str) -> Protocol {
        if name == "Dragon" {
            Protocol::Dragon
        } else {
            Protocol::Mesi
        }
    }

    /// Panics with a diagnostic if `state` does not belong to this protocol.
    /// `NotPresent` is valid under either protocol, since it is the
    /// out-of-band empty-slot sentinel rather than a protocol state.
    pub fn assert_owns(&self, state: CacheState, core_idx: usize, addr: u32) {
        let ok = match self {
            Protocol::Mesi => matches!(
                state,
                CacheState::Modified
                    | CacheState::Exclusive
                    | CacheState::Shared
                    | CacheState::Invalid
                    | CacheState::NotPresent
            ),
            Protocol::Dragon => matches!(
                state,
                CacheState::ExclusiveClean
                    | CacheState::SharedClean
                    | CacheState::SharedModified
                    | CacheState::Dirty
                    | CacheState::NotPresent
            ),
        };
        assert!(
            ok,
            "invariant violation: state {:?} does not belong to protocol {:?} \
             (core {}, addr {:#010x})",
            state, self, core_idx, addr
        );
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Mesi => write!(f, "MESI"),
            Protocol::Dragon => write!(f, "Dragon"),
        }
    }
}

/// The coherence state of a cache line, spanning both protocols plus the
/// out-of-band "no entry with this tag" sentinel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CacheState {
    // MESI
    Modified,
    Exclusive,
    Shared,
    Invalid,

    // Dragon
    ExclusiveClean,
    SharedClean,
    SharedModified,
    Dirty,

    /// Sentinel: no line with this tag exists in the set. Never stored in a
    /// line; only ever returned from a lookup.
    NotPresent,
}

impl CacheState {
    /// Whether this state counts as a hit on a processor access, per the
    /// protocol-specific hit definition in spec §4.5.
    pub fn is_hit(&self, protocol: Protocol) -> bool {
        match protocol {
            Protocol::Mesi => !matches!(self, CacheState::Invalid | CacheState::NotPresent),
            Protocol::Dragon => !matches!(self, CacheState::NotPresent),
        }
    }

    /// Whether a line in this state must be written back to memory before
    /// it can be evicted or overwritten by a snoop-driven invalidate.
    pub fn is_dirty(&self) -> bool {
        matches!(
            self,
            CacheState::Modified | CacheState::Dirty | CacheState::SharedModified
        )
    }

    /// Private-access classification (spec §4.6): the block is held by
    /// exactly one cache.
    pub fn is_private(&self) -> bool {
        matches!(
            self,
            CacheState::Modified
                | CacheState::Exclusive
                | CacheState::ExclusiveClean
                | CacheState::Dirty
        )
    }

    /// Shared-access classification (spec §4.6): the block may be held by
    /// more than one cache.
    pub fn is_shared(&self) -> bool {
        matches!(
            self,
            CacheState::Shared | CacheState::SharedClean | CacheState::SharedModified
        )
    }
}

impl fmt::Display for CacheState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CacheState::Modified => "Modified",
            CacheState::Exclusive => "Exclusive",
            CacheState::Shared => "Shared",
            CacheState::Invalid => "Invalid",
            CacheState::ExclusiveClean => "ExclusiveClean",
            CacheState::SharedClean => "SharedClean",
            CacheState::SharedModified => "SharedModified",
            CacheState::Dirty => "Dirty",
            CacheState::NotPresent => "NotPresent",
        };
        write!(f, "{}", s)
    }
}

/// A coherence transaction carried on the bus.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BusTxn {
    /// Request a line for reading; others may supply it.
    BusRd,
    /// Request exclusive ownership for writing; invalidates others (MESI only).
    BusRdX,
    /// Push an updated value to sharers (Dragon only).
    BusUpd,
    /// Write a dirty block back to memory.
    Flush,
}

/// The classification a snooping cache returns in response to a bus
/// transaction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SnoopResponse {
    NoCopy,
    SharedCopy,
    DirtyCopy,
}

impl SnoopResponse {
    /// Aggregate this response with another, per the precedence in spec
    /// §4.1: `DirtyCopy` beats `SharedCopy` beats `NoCopy`.
    pub fn combine(self, other: SnoopResponse) -> SnoopResponse {
        use SnoopResponse::*;
        match (self, other) {
            (DirtyCopy, _) | (_, DirtyCopy) => DirtyCopy,
            (SharedCopy, _) | (_, SharedCopy) => SharedCopy,
            (NoCopy, NoCopy) => NoCopy,
        }
    }

    pub fn any_copy(&self) -> bool {
        !matches!(self, SnoopResponse::NoCopy)
    }
}
