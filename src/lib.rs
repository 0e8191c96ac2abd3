//! Trace-driven simulator for a shared-bus, multi-core MESI/Dragon
//! cache-coherence subsystem.
//!
//! The coherence engine — the per-core LRU caches, the bus, and the MESI
//! and Dragon protocol tables — is the substantive design (see `cache.rs`,
//! `bus.rs`, `protocol.rs`, `lru_set.rs`). Trace parsing, CLI parsing, and
//! report formatting are its collaborators, not part of it.

pub mod bus;
pub mod cache;
pub mod cli;
pub mod cost;
pub mod error;
pub mod lru_set;
pub mod profiler;
pub mod protocol;
pub mod report;
pub mod state;
pub mod system;
pub mod trace;

pub use cli::{Cli, SimConfig};
pub use error::SimError;

/// Validate `cli`, run the simulation it describes, and render the report.
pub fn run(cli: Cli) -> Result<String, SimError> {
    let config = cli.into_config()?;
    let result = system::run(&config)?;
    Ok(report::render(&result.profiler, &result.bus))
}
