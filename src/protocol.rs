//! The MESI and Dragon transition tables (spec §4.3, §4.4), expressed as
//! pure functions over `(current state, event) -> (next state, bus request,
//! response classification)`.
//!
//! Nothing in this module touches a lock or the bus directly — it only
//! decides what *should* happen. `Cache` (see `cache.rs`) is responsible for
//! acquiring the right locks, calling `Bus::broadcast` with the transaction
//! these functions choose, and feeding the aggregated response back in.
//! Keeping the tables pure makes them exhaustively matchable and directly
//! unit-testable without any concurrency machinery.

use crate::state::{BusTxn, CacheState, Protocol, SnoopResponse};

/// What a processor-side read hit requires of the caller.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ReadHitAction {
    /// The line is already valid; no bus transaction needed.
    Resolved(CacheState),
    /// The line is present but stale (MESI `Invalid`); issue `BusRd` and
    /// call [`resolve_read_refresh`] with the response.
    NeedsBusRd,
}

/// What a processor-side write hit requires of the caller.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum WriteHitAction {
    /// No bus transaction needed.
    Resolved(CacheState),
    /// MESI: issue `BusRdX`; the resulting state is always `Modified`
    /// regardless of the response (the response only affects bus
    /// accounting, handled by the bus itself).
    NeedsBusRdX,
    /// Dragon: issue `BusUpd`; call [`resolve_write_update`] with the
    /// response to get the resulting state.
    NeedsBusUpd,
}

/// The outcome of a snoop reaction (spec §4.4).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct SnoopOutcome {
    pub next_state: CacheState,
    pub response: SnoopResponse,
    /// Whether this snoop reaction requires a write-back. The bus accounts
    /// for this directly rather than recursing into another `broadcast`
    /// call (spec §5a).
    pub emits_flush: bool,
}

/// Processor-side read on a present line (spec §4.3 `read`).
pub fn read_hit(protocol: Protocol, state: CacheState, core_idx: usize, addr: u32) -> ReadHitAction {
    protocol.assert_owns(state, core_idx, addr);
    match protocol {
        Protocol::Mesi => match state {
            CacheState::Invalid => ReadHitAction::NeedsBusRd,
            other => ReadHitAction::Resolved(other),
        },
        // Dragon never transitions on a processor read hit.
        Protocol::Dragon => ReadHitAction::Resolved(state),
    }
}

/// Resolve a MESI read-hit-on-`Invalid` refresh, or a read-miss allocation,
/// from the aggregated snoop response: shared if anyone still has a copy,
/// exclusive otherwise. Used by both the hit-refresh path and the
/// allocate path, since both ask the same question of the bus.
pub fn resolve_read_refresh(protocol: Protocol, response: SnoopResponse) -> CacheState {
    match protocol {
        Protocol::Mesi => {
            if response.any_copy() {
                CacheState::Shared
            } else {
                CacheState::Exclusive
            }
        }
        Protocol::Dragon => {
            if response.any_copy() {
                CacheState::SharedClean
            } else {
                CacheState::ExclusiveClean
            }
        }
    }
}

/// Processor-side write on a present line (spec §4.3 `write`).
pub fn write_hit(protocol: Protocol, state: CacheState, core_idx: usize, addr: u32) -> WriteHitAction {
    protocol.assert_owns(state, core_idx, addr);
    match protocol {
        Protocol::Mesi => match state {
            CacheState::Modified | CacheState::Exclusive => {
                WriteHitAction::Resolved(CacheState::Modified)
            }
            CacheState::Shared | CacheState::Invalid => WriteHitAction::NeedsBusRdX,
            CacheState::NotPresent => unreachable!("write_hit called with NotPresent"),
            _ => unreachable!("non-MESI state in MESI write_hit"),
        },
        Protocol::Dragon => match state {
            CacheState::ExclusiveClean => WriteHitAction::Resolved(CacheState::Dirty),
            CacheState::Dirty => WriteHitAction::Resolved(CacheState::Dirty),
            CacheState::SharedClean | CacheState::SharedModified => WriteHitAction::NeedsBusUpd,
            CacheState::NotPresent => unreachable!("write_hit called with NotPresent"),
            _ => unreachable!("non-Dragon state in Dragon write_hit"),
        },
    }
}

/// Resolve a Dragon write-hit `BusUpd`: `SharedModified` if any snooper
/// still held the line, `Dirty` if this cache is now the sole holder.
pub fn resolve_write_update(response: SnoopResponse) -> CacheState {
    if response.any_copy() {
        CacheState::SharedModified
    } else {
        CacheState::Dirty
    }
}

/// The bus transaction a read miss (allocate, not a write) issues. Both
/// protocols issue `BusRd`.
pub fn read_miss_request(_protocol: Protocol) -> BusTxn {
    BusTxn::BusRd
}

/// The first bus transaction a write miss (allocate) issues.
pub fn write_miss_first_request(protocol: Protocol) -> BusTxn {
    match protocol {
        Protocol::Mesi => BusTxn::BusRdX,
        Protocol::Dragon => BusTxn::BusRd,
    }
}

/// Resolve a MESI write-miss allocation: always `Modified`, regardless of
/// the `BusRdX` response (the response only drives bus traffic accounting).
pub fn resolve_write_miss_mesi(_response: SnoopResponse) -> CacheState {
    CacheState::Modified
}

/// Resolve a Dragon write-miss allocation after the initial `BusRd`: if any
/// copy exists elsewhere, a second `BusUpd` is required and the resulting
/// state is `SharedModified`; otherwise no second transaction is needed and
/// the state is `Dirty`.
pub fn resolve_write_miss_dragon(response: SnoopResponse) -> (CacheState, bool) {
    if response.any_copy() {
        (CacheState::SharedModified, true)
    } else {
        (CacheState::Dirty, false)
    }
}

/// The bus-side snoop reaction for a single peer cache (spec §4.4). `state`
/// is `NotPresent` when the peer's set has no line with this tag.
pub fn snoop(protocol: Protocol, state: CacheState, txn: BusTxn, core_idx: usize, addr: u32) -> SnoopOutcome {
    if state == CacheState::NotPresent {
        return SnoopOutcome {
            next_state: CacheState::NotPresent,
            response: SnoopResponse::NoCopy,
            emits_flush: false,
        };
    }

    protocol.assert_owns(state, core_idx, addr);

    match protocol {
        Protocol::Mesi => mesi_snoop(state, txn, core_idx, addr),
        Protocol::Dragon => dragon_snoop(state, txn, core_idx, addr),
    }
}

fn mesi_snoop(state: CacheState, txn: BusTxn, core_idx: usize, addr: u32) -> SnoopOutcome {
    use BusTxn::*;
    use CacheState::*;

    match (state, txn) {
        (Modified, BusRd) => SnoopOutcome {
            next_state: Shared,
            response: SnoopResponse::DirtyCopy,
            emits_flush: true,
        },
        (Modified, BusRdX) => SnoopOutcome {
            next_state: Invalid,
            response: SnoopResponse::DirtyCopy,
            emits_flush: true,
        },
        (Exclusive, BusRd) => SnoopOutcome {
            next_state: Shared,
            response: SnoopResponse::SharedCopy,
            emits_flush: false,
        },
        (Exclusive, BusRdX) => SnoopOutcome {
            next_state: Invalid,
            response: SnoopResponse::SharedCopy,
            emits_flush: false,
        },
        (Shared, BusRd) => SnoopOutcome {
            next_state: Shared,
            response: SnoopResponse::SharedCopy,
            emits_flush: false,
        },
        (Shared, BusRdX) => SnoopOutcome {
            next_state: Invalid,
            response: SnoopResponse::SharedCopy,
            emits_flush: false,
        },
        (Invalid, _) => SnoopOutcome {
            next_state: Invalid,
            response: SnoopResponse::NoCopy,
            emits_flush: false,
        },
        (s, t) => unreachable!(
            "invariant violation: impossible MESI snoop (core {}, addr {:#010x}, \
             protocol MESI, state {:?}, txn {:?})",
            core_idx, addr, s, t
        ),
    }
}

fn dragon_snoop(state: CacheState, txn: BusTxn, core_idx: usize, addr: u32) -> SnoopOutcome {
    use BusTxn::*;
    use CacheState::*;

    match (state, txn) {
        (ExclusiveClean, BusRd) => SnoopOutcome {
            next_state: SharedClean,
            response: SnoopResponse::SharedCopy,
            emits_flush: false,
        },
        (Dirty, BusRd) => SnoopOutcome {
            next_state: SharedModified,
            response: SnoopResponse::DirtyCopy,
            emits_flush: true,
        },
        (SharedClean, BusRd) => SnoopOutcome {
            next_state: SharedClean,
            response: SnoopResponse::SharedCopy,
            emits_flush: false,
        },
        (SharedModified, BusRd) => SnoopOutcome {
            next_state: SharedModified,
            response: SnoopResponse::DirtyCopy,
            emits_flush: true,
        },
        (SharedClean, BusUpd) => SnoopOutcome {
            next_state: SharedClean,
            response: SnoopResponse::SharedCopy,
            emits_flush: false,
        },
        (SharedModified, BusUpd) => SnoopOutcome {
            next_state: SharedClean,
            response: SnoopResponse::DirtyCopy,
            emits_flush: false,
        },
        // ExclusiveClean/Dirty never see BusUpd: a writer in those states
        // writes without emitting BusUpd in the first place (spec §4.3).
        (s, t) => unreachable!(
            "invariant violation: impossible Dragon snoop (core {}, addr {:#010x}, \
             protocol Dragon, state {:?}, txn {:?})",
            core_idx, addr, s, t
        ),
    }
}
