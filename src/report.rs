//! stdout report formatting (spec §6.4). A collaborator of the core (spec
//! §1): it only reads the profiler's and bus's public counters, it never
//! mutates them.

use std::fmt::Write as _;

use crate::bus::Bus;
use crate::profiler::Profiler;

/// Render the per-core and global statistics blocks.
pub fn render(profiler: &Profiler, bus: &Bus) -> String {
    let mut out = String::new();

    for i in 0..profiler.num_cores() {
        let c = profiler.core(i);
        let _ = writeln!(out, "[Core {i}]");
        let _ = writeln!(out, "Cycles: {}", c.cycles);
        let _ = writeln!(out, "Idle cycles: {}", c.idle_cycles);
        let _ = writeln!(out, "Compute cycles: {}", c.compute_cycles);
        let _ = writeln!(out, "Loads: {}", c.loads);
        let _ = writeln!(out, "Stores: {}", c.stores);
        let _ = writeln!(out, "Cache hits: {}", c.hits);
        let _ = writeln!(out, "Cache misses: {}", c.misses);
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "[Global]");

    let max_cycles = (0..profiler.num_cores())
        .map(|i| profiler.core(i).cycles)
        .max()
        .unwrap_or(0);
    let _ = writeln!(out, "Overall cycles (maximum among cores): {max_cycles}");

    let total_idle: u64 = (0..profiler.num_cores()).map(|i| profiler.core(i).idle_cycles).sum();
    let _ = writeln!(out, "Total idle cycles: {total_idle}");

    let total_hits: u64 = (0..profiler.num_cores()).map(|i| profiler.core(i).hits).sum();
    let total_misses: u64 = (0..profiler.num_cores()).map(|i| profiler.core(i).misses).sum();
    let (hit_pct, miss_pct) = percentages(total_hits, total_hits + total_misses);
    let _ = writeln!(out, "Cache hit rate (%): {hit_pct:.1} ({total_hits})");
    let _ = writeln!(out, "Cache miss rate (%): {miss_pct:.1} ({total_misses})");

    let _ = writeln!(out, "Total bus traffic (bytes): {}", bus.total_traffic_bytes());
    let _ = writeln!(
        out,
        "Total bus invalidations / updates: {}",
        bus.total_invalidations_or_updates()
    );

    let private = profiler.private_accesses();
    let shared = profiler.shared_accesses();
    let (private_pct, shared_pct) = percentages(private, private + shared);
    let _ = writeln!(out, "Private data access (%): {private_pct:.1}");
    let _ = writeln!(out, "Shared data access (%): {shared_pct:.1}");

    out
}

/// `(numerator/denominator * 100, its complement)`, or `(0.0, 0.0)` if
/// there were no accesses to classify at all.
fn percentages(numerator: u64, denominator: u64) -> (f64, f64) {
    if denominator == 0 {
        return (0.0, 0.0);
    }
    let pct = numerator as f64 / denominator as f64 * 100.0;
    (pct, 100.0 - pct)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::Bus;
    use crate::cache::AccessOutcome;
    use crate::profiler::Profiler;
    use crate::state::CacheState;

    #[test]
    fn report_contains_expected_headers() {
        let profiler = Profiler::new(1);
        profiler.record_load(
            0,
            AccessOutcome {
                cycles: 1,
                hit: true,
                prev_state: CacheState::Exclusive,
                new_state: CacheState::Exclusive,
            },
        );
        let bus = Bus::new(16, 4);
        let text = render(&profiler, &bus);
        assert!(text.contains("[Core 0]"));
        assert!(text.contains("[Global]"));
        assert!(text.contains("Cache hit rate (%): 100.0 (1)"));
        assert!(text.contains("Cache miss rate (%): 0.0 (0)"));
    }

    #[test]
    fn empty_report_does_not_divide_by_zero() {
        let profiler = Profiler::new(1);
        let bus = Bus::new(16, 4);
        let text = render(&profiler, &bus);
        assert!(text.contains("Cache hit rate (%): 0.0 (0)"));
        assert!(text.contains("Private data access (%): 0.0"));
    }
}
