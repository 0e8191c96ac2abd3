//! Owns the caches and the bus for one simulation run, and drives them to
//! completion in either scheduling mode (spec §5 — component 5 +
//! concurrency model).

use std::thread;

use log::{info, trace};

use crate::bus::Bus;
use crate::cache::Cache;
use crate::cli::{ExecutionMode, SimConfig, MAX_CORES};
use crate::error::SimError;
use crate::profiler::Profiler;
use crate::trace::{load_traces, Instruction, Trace};

/// A word is always 4 bytes in this simulator (spec §6.3); it is not
/// configurable.
const WORD_SIZE_BYTES: u64 = 4;

pub struct SimResult {
    pub profiler: Profiler,
    pub bus: Bus,
    /// The per-core caches in their final post-simulation state. Exposed
    /// mainly so callers (tests, in particular) can check the exact final
    /// coherence state of a block against the scenarios in spec §8, rather
    /// than only the aggregate counters.
    pub caches: Vec<Cache>,
}

/// Build the caches and bus from `config`, load traces, and run the
/// simulation to completion.
pub fn run(config: &SimConfig) -> Result<SimResult, SimError> {
    let traces = load_traces(&config.trace_prefix, MAX_CORES)?;
    let num_cores = traces.len();

    let caches: Vec<Cache> = (0..num_cores)
        .map(|_| {
            Cache::new(
                config.protocol,
                config.cache_size_bytes,
                config.block_size_bytes,
                config.associativity,
            )
        })
        .collect::<Result<_, _>>()?;
    let bus = Bus::new(config.block_size_bytes, WORD_SIZE_BYTES);
    let profiler = Profiler::new(num_cores);

    if let Some(cache) = caches.first() {
        info!(
            "starting simulation: protocol {}, {num_cores} core(s), {} set(s) per cache",
            cache.protocol(),
            cache.num_sets()
        );
    }

    match config.mode {
        ExecutionMode::Serial => run_serial(&caches, &bus, &profiler, traces, config.verbose),
        ExecutionMode::Parallel => run_parallel(&caches, &bus, &profiler, traces, config.verbose),
    }

    Ok(SimResult { profiler, bus, caches })
}

/// Single-threaded cooperative scheduling: each step, every core that still
/// has instructions advances by exactly one (spec §5 "Serial mode").
fn run_serial(caches: &[Cache], bus: &Bus, profiler: &Profiler, mut traces: Vec<Trace>, verbose: u8) {
    loop {
        let mut any_progress = false;
        for (core_idx, trace) in traces.iter_mut().enumerate() {
            if !trace.has_next() {
                continue;
            }
            any_progress = true;
            let ins = trace.next().expect("has_next() just confirmed a next instruction");
            step(core_idx, ins, caches, bus, profiler, verbose);
        }
        if !any_progress {
            break;
        }
    }
}

/// One thread per core, each consuming its own trace independently, joined
/// via `std::thread::scope` so every thread can borrow `caches` and `bus`
/// for the scope's lifetime without `Arc` (spec §5 "Parallel mode").
fn run_parallel(caches: &[Cache], bus: &Bus, profiler: &Profiler, traces: Vec<Trace>, verbose: u8) {
    thread::scope(|scope| {
        for (core_idx, mut trace) in traces.into_iter().enumerate() {
            scope.spawn(move || {
                while let Some(ins) = trace.next() {
                    step(core_idx, ins, caches, bus, profiler, verbose);
                }
            });
        }
    });
}

fn step(core_idx: usize, ins: Instruction, caches: &[Cache], bus: &Bus, profiler: &Profiler, verbose: u8) {
    match ins {
        Instruction::Load(addr) => {
            let outcome = caches[core_idx].load(addr, core_idx, bus, caches);
            if verbose >= 2 {
                trace!(
                    "core {core_idx} load {addr:#010x}: {:?} -> {:?} ({} cycles)",
                    outcome.prev_state,
                    outcome.new_state,
                    outcome.cycles
                );
            }
            profiler.record_load(core_idx, outcome);
        }
        Instruction::Store(addr) => {
            let outcome = caches[core_idx].store(addr, core_idx, bus, caches);
            if verbose >= 2 {
                trace!(
                    "core {core_idx} store {addr:#010x}: {:?} -> {:?} ({} cycles)",
                    outcome.prev_state,
                    outcome.new_state,
                    outcome.cycles
                );
            }
            profiler.record_store(core_idx, outcome);
        }
        Instruction::Compute(cycles) => {
            profiler.record_compute(core_idx, cycles as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Protocol;
    use std::path::PathBuf;

    fn config(protocol: Protocol, mode: ExecutionMode) -> SimConfig {
        SimConfig {
            protocol,
            trace_prefix: PathBuf::from("nonexistent"),
            cache_size_bytes: 64,
            associativity: 2,
            block_size_bytes: 16,
            mode,
            verbose: 0,
        }
    }

    #[test]
    fn missing_trace_at_core_zero_is_fatal() {
        let cfg = config(Protocol::Mesi, ExecutionMode::Serial);
        assert!(run(&cfg).is_err());
    }

    #[test]
    fn serial_and_parallel_agree_on_final_traffic_for_independent_cores() {
        // Two single-instruction traces to distinct blocks never interact
        // on the bus beyond their own compulsory miss, so both modes must
        // report identical counters.
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("trace");
        std::fs::write(format!("{}_0.data", prefix.display()), "0 0x0\n").unwrap();
        std::fs::write(format!("{}_1.data", prefix.display()), "0 0x40\n").unwrap();

        let serial = run(&SimConfig {
            trace_prefix: prefix.clone(),
            ..config(Protocol::Mesi, ExecutionMode::Serial)
        })
        .unwrap();
        let parallel = run(&SimConfig {
            trace_prefix: prefix,
            ..config(Protocol::Mesi, ExecutionMode::Parallel)
        })
        .unwrap();

        assert_eq!(serial.bus.total_traffic_bytes(), parallel.bus.total_traffic_bytes());
        assert_eq!(
            serial.bus.total_invalidations_or_updates(),
            parallel.bus.total_invalidations_or_updates()
        );
        assert_eq!(serial.profiler.core(0).cycles, parallel.profiler.core(0).cycles);
    }

    #[test]
    fn s1_mesi_read_then_read_sharing() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("trace");
        std::fs::write(format!("{}_0.data", prefix.display()), "0 0x0\n").unwrap();
        std::fs::write(format!("{}_1.data", prefix.display()), "0 0x0\n").unwrap();

        let cfg = SimConfig {
            trace_prefix: prefix,
            ..config(Protocol::Mesi, ExecutionMode::Serial)
        };
        let result = run(&cfg).unwrap();

        assert_eq!(result.bus.total_traffic_bytes(), 2 * 16);
        assert_eq!(result.bus.total_invalidations_or_updates(), 0);
        assert_eq!(result.profiler.core(0).hits, 0);
        assert_eq!(result.profiler.core(0).misses, 1);
        assert_eq!(result.profiler.core(1).hits, 0);
        assert_eq!(result.profiler.core(1).misses, 1);
    }

    #[test]
    fn s6_compute_passthrough() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("trace");
        std::fs::write(format!("{}_0.data", prefix.display()), "2 0x0000000A\n").unwrap();

        let cfg = SimConfig {
            trace_prefix: prefix,
            ..config(Protocol::Mesi, ExecutionMode::Serial)
        };
        let result = run(&cfg).unwrap();

        let c = result.profiler.core(0);
        assert_eq!(c.compute_cycles, 10);
        assert_eq!(c.idle_cycles, 0);
        assert_eq!(result.bus.total_traffic_bytes(), 0);
    }
}
