use std::path::PathBuf;
use thiserror::Error;

/// Failures surfaced by the measurement engine and its result sink
#[derive(Debug, Error)]
pub enum ProfilerError {
    /// A working set or eviction buffer could not be allocated. Fatal for the sweep.
    #[error("failed to allocate {bytes} bytes")]
    Allocation { bytes: usize },

    /// The scheduler refused to pin the measuring thread. Only ever logged.
    #[error("could not pin measuring thread to CPU core {core}")]
    AffinityRequest { core: usize },

    /// A timed region was too short for the clock to resolve
    #[error(
        "timer could not resolve measurement for {size_bytes} byte working set \
         (elapsed {elapsed_ns} ns, granularity {granularity_ns} ns)"
    )]
    TimerResolution {
        size_bytes: usize,
        elapsed_ns: u128,
        granularity_ns: u128,
    },

    #[error("could not write results to {}", path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("working set must be at least one byte")]
    EmptyWorkingSet,

    #[error("invalid sweep configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, ProfilerError>;
