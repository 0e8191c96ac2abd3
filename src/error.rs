//! The error taxonomy of spec §7: configuration errors are fatal before
//! simulation starts, trace errors are fatal only at core 0. Per-line parse
//! failures and unknown instruction types are *not* represented here — they
//! warn and skip (see `trace.rs`), since spec §7.3 treats them as
//! recoverable by construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("trace error: {0}")]
    Trace(#[from] TraceError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{dimension} must be a power of two, got {value}")]
    NotPowerOfTwo { dimension: &'static str, value: u64 },

    #[error(
        "cache_size ({cache_size}) is not divisible by block_size * associativity \
         ({block_size} * {associativity} = {product})"
    )]
    IndivisibleGeometry {
        cache_size: u64,
        block_size: u64,
        associativity: u64,
        product: u64,
    },
}

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("no trace file found at '{0}'; at least one core is required")]
    NoTraceFiles(String),

    #[error("failed to read trace file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}
