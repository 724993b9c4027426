//! Cache and memory latency profiling via pointer chasing.
//!
//! A [`Sweep`] measures access latency across a range of working-set sizes. Each sample builds a
//! randomized single-cycle [`Chain`](chain::Chain) (or, for very large sets, a
//! [`ScatteredBuffer`](scatter::ScatteredBuffer)), flushes the caches with an [`Evictor`], warms
//! the set back in and times it. Latency jumps across the size range mark the boundaries of the
//! cache hierarchy.
pub mod affinity;
pub mod chain;
pub mod config;
pub mod error;
pub mod evict;
pub mod harness;
pub mod output;
pub mod scatter;
pub mod sweep;
pub mod timer;
pub mod warmup;
pub mod workset;

pub use config::SweepConfig;
pub use error::{ProfilerError, Result};
pub use evict::{CacheEvictor, Evictor};
pub use harness::{Harness, TimedHarness};
pub use sweep::{ProgressObserver, SizeResult, Sweep};
pub use workset::WorkingSet;

/// Bytes per cache line. Every access in a measurement touches exactly one line.
pub const CACHE_LINE_SIZE: usize = 64;

/// Convert number of bytes to formatted string
pub fn format_size(bytes: f32) -> String {
    const GB: f32 = 1024.0 * 1024.0 * 1024.0;
    const MB: f32 = 1024.0 * 1024.0;
    const KB: f32 = 1024.0;

    if bytes >= GB {
        format!("{:.2} GiB", bytes / GB)
    } else if bytes >= MB {
        format!("{:.2} MiB", bytes / MB)
    } else if bytes >= KB {
        format!("{:.2} KiB", bytes / KB)
    } else {
        format!("{:.2} B", bytes)
    }
}

/// Convert number of bytes to formatted string for fixed-width integer string
pub fn format_size_fixed_int(bytes: u64) -> String {
    const GB: u64 = 1024 * 1024 * 1024;
    const MB: u64 = 1024 * 1024;
    const KB: u64 = 1024;

    if bytes >= GB {
        format!("{:>4} GiB", bytes / GB)
    } else if bytes >= MB {
        format!("{:>4} MiB", bytes / MB)
    } else if bytes >= KB {
        format!("{:>4} KiB", bytes / KB)
    } else {
        format!("{:>4} B", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_format_with_binary_units() {
        assert_eq!(format_size(512.0), "512.00 B");
        assert_eq!(format_size(32.0 * 1024.0), "32.00 KiB");
        assert_eq!(format_size_fixed_int(4096), "   4 KiB");
        assert_eq!(format_size_fixed_int(8 * 1024 * 1024), "   8 MiB");
    }
}
