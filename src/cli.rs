//! Command-line surface (spec §6.1, §6.1a): `simulator <protocol>
//! <trace_prefix> <cache_size_bytes> <associativity> <block_size_bytes>`
//! plus `--parallel` and repeatable `-v`/`--verbose`.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{ConfigError, SimError};
use crate::state::Protocol;

/// Hard cap on discovered cores (spec §6.1).
pub const MAX_CORES: usize = 4;

/// Which scheduling model drives the simulation (spec §5).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExecutionMode {
    Serial,
    Parallel,
}

#[derive(Parser, Debug)]
#[command(
    name = "simulator",
    about = "Trace-driven MESI/Dragon cache-coherence simulator"
)]
pub struct Cli {
    /// `MESI` or `Dragon`; anything else defaults to MESI (case-sensitive).
    pub protocol: String,

    /// Trace files are `<trace_prefix>_<i>.data` for i = 0, 1, ...
    pub trace_prefix: PathBuf,

    /// Total cache capacity in bytes; must be a power of two.
    pub cache_size_bytes: u64,

    /// Lines per set; must be a power of two.
    pub associativity: u64,

    /// Bytes per block; must be a power of two.
    pub block_size_bytes: u64,

    /// Run cores on independent threads instead of the serial reference
    /// scheduler (spec §5).
    #[arg(long)]
    pub parallel: bool,

    /// Raise log verbosity; repeat (`-vv`) for trace-level per-access logs.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// The validated, fully-resolved configuration built by this layer before
/// any cache or bus object is constructed.
pub struct SimConfig {
    pub protocol: Protocol,
    pub trace_prefix: PathBuf,
    pub cache_size_bytes: u64,
    pub associativity: u64,
    pub block_size_bytes: u64,
    pub mode: ExecutionMode,
    pub verbose: u8,
}

impl Cli {
    /// Validate geometry and resolve the protocol name, or fail with a
    /// `ConfigError` before any cache is constructed.
    pub fn into_config(self) -> Result<SimConfig, SimError> {
        check_power_of_two("cache_size_bytes", self.cache_size_bytes)?;
        check_power_of_two("associativity", self.associativity)?;
        check_power_of_two("block_size_bytes", self.block_size_bytes)?;

        let product = self.block_size_bytes * self.associativity;
        if self.cache_size_bytes % product != 0 {
            return Err(ConfigError::IndivisibleGeometry {
                cache_size: self.cache_size_bytes,
                block_size: self.block_size_bytes,
                associativity: self.associativity,
                product,
            }
            .into());
        }

        Ok(SimConfig {
            protocol: Protocol::parse(&self.protocol),
            trace_prefix: self.trace_prefix,
            cache_size_bytes: self.cache_size_bytes,
            associativity: self.associativity,
            block_size_bytes: self.block_size_bytes,
            mode: if self.parallel {
                ExecutionMode::Parallel
            } else {
                ExecutionMode::Serial
            },
            verbose: self.verbose,
        })
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

    fn base_cli() -> Cli {
        Cli {
            protocol: "MESI".into(),
            trace_prefix: PathBuf::from("trace"),
            cache_size_bytes: 64,
            associativity: 2,
            block_size_bytes: 16,
            parallel: false,
            verbose: 0,
        }
    }

    #[test]
    fn valid_geometry_builds_config() {
        let cfg = base_cli().into_config().unwrap();
        assert_eq!(cfg.protocol, Protocol::Mesi);
        assert_eq!(cfg.mode, ExecutionMode::Serial);
    }

    #[test]
    fn parallel_flag_selects_parallel_mode() {
        let mut cli = base_cli();
        cli.parallel = true;
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.mode, ExecutionMode::Parallel);
    }

    #[test]
    fn non_power_of_two_cache_size_is_rejected() {
        let mut cli = base_cli();
        cli.cache_size_bytes = 100;
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn indivisible_geometry_is_rejected() {
        let mut cli = base_cli();
        // All three are individually powers of two, but 32 % (16 * 4) != 0.
        cli.cache_size_bytes = 32;
        cli.associativity = 4;
        cli.block_size_bytes = 16;
        assert!(cli.into_config().is_err());
    }

    #[test]
    fn unknown_protocol_defaults_to_mesi() {
        let mut cli = base_cli();
        cli.protocol = "Unknown".into();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.protocol, Protocol::Mesi);
    }

    #[test]
    fn dragon_is_case_sensitive() {
        let mut cli = base_cli();
        cli.protocol = "dragon".into();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.protocol, Protocol::Mesi);

        let mut cli = base_cli();
        cli.protocol = "Dragon".into();
        let cfg = cli.into_config().unwrap();
        assert_eq!(cfg.protocol, Protocol::Dragon);
    }
}
