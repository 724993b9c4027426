//! Sweep configuration. Plain values with defaults tuned for a 64-byte-line x86 desktop part;
//! other microarchitectures need their own numbers.
use crate::error::{ProfilerError, Result};
use crate::evict::DEFAULT_EVICTION_BYTES;
use crate::harness::DEFAULT_BATCH_SIZE;

const KB: usize = 1024;
const MB: usize = 1024 * 1024;

pub const DEFAULT_ITERATIONS: usize = 10_000_000;
pub const DEFAULT_SAMPLES: usize = 10;
pub const DEFAULT_CORE: usize = 1;
pub const DEFAULT_BATCH_THRESHOLD: usize = 64 * MB;

#[derive(Clone, Debug, PartialEq)]
pub struct SweepConfig {
    /// Working-set sizes in bytes
    pub sizes: Vec<usize>,
    /// Accesses timed per sample
    pub iterations: usize,
    pub samples_per_size: usize,
    pub eviction_bytes: usize,
    /// Core to pin the measuring thread to, `None` to leave scheduling alone
    pub core: Option<usize>,
    /// Sizes at or above this are measured with batched random offsets instead of a chain
    pub batch_threshold_bytes: usize,
    pub batch_size: usize,
    /// Fixed RNG seed for reproducible chain layouts, `None` seeds from OS entropy
    pub seed: Option<u64>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        SweepConfig {
            sizes: doubling_sizes(4 * KB, 8 * MB),
            iterations: DEFAULT_ITERATIONS,
            samples_per_size: DEFAULT_SAMPLES,
            eviction_bytes: DEFAULT_EVICTION_BYTES,
            core: Some(DEFAULT_CORE),
            batch_threshold_bytes: DEFAULT_BATCH_THRESHOLD,
            batch_size: DEFAULT_BATCH_SIZE,
            seed: None,
        }
    }
}

impl SweepConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ProfilerError::InvalidConfig(msg.to_string()));
        if self.sizes.is_empty() {
            return invalid("no working-set sizes given");
        }
        if self.sizes.contains(&0) {
            return invalid("working-set sizes must be non-zero");
        }
        if self.iterations == 0 {
            return invalid("iterations must be non-zero");
        }
        if self.samples_per_size == 0 {
            return invalid("samples per size must be non-zero");
        }
        if self.eviction_bytes == 0 {
            return invalid("eviction buffer must be non-zero");
        }
        if self.batch_size == 0 {
            return invalid("batch size must be non-zero");
        }
        Ok(())
    }
}

/// 4 KiB to 8 MiB with 1.5x steps between the doublings from 16 KiB, for finer resolution at
/// level boundaries
pub const FINE_SIZES_KB: [usize; 21] = [
    4, 8, 16, 24, 32, 48, 64, 96, 128, 192, 256, 384, 512, 768, 1024, 1536, 2048, 3072, 4096, 6144,
    8192,
];

/// [`FINE_SIZES_KB`] in bytes
pub fn fine_sizes() -> Vec<usize> {
    FINE_SIZES_KB.iter().map(|kb| kb * KB).collect()
}

/// `min`, `2*min`, `4*min`, ... up to and including `max`
pub fn doubling_sizes(min: usize, max: usize) -> Vec<usize> {
    if min == 0 {
        return Vec::new();
    }
    std::iter::successors(Some(min), |&s| s.checked_mul(2))
        .take_while(|&s| s <= max)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = SweepConfig::default();
        config.validate().unwrap();
        assert_eq!(config.sizes.first(), Some(&(4 * KB)));
        assert_eq!(config.sizes.last(), Some(&(8 * MB)));
        assert_eq!(config.sizes.len(), 12);
    }

    #[test]
    fn doubling_stops_at_max() {
        assert_eq!(doubling_sizes(4, 40), vec![4, 8, 16, 32]);
        assert_eq!(doubling_sizes(4, 4), vec![4]);
        assert!(doubling_sizes(8, 4).is_empty());
        assert!(doubling_sizes(0, 4).is_empty());
    }

    #[test]
    fn fine_preset_interleaves_half_steps() {
        let sizes = fine_sizes();
        assert_eq!(sizes.len(), 21);
        assert_eq!(sizes.first(), Some(&(4 * KB)));
        assert_eq!(sizes.last(), Some(&(8 * MB)));
        assert!(sizes.windows(2).all(|w| w[0] < w[1]));
        // every doubling from the default sweep is still measured
        assert!(doubling_sizes(4 * KB, 8 * MB).iter().all(|s| sizes.contains(s)));
        assert!(sizes.contains(&(24 * KB)) && sizes.contains(&(6144 * KB)));
    }

    #[test]
    fn zero_values_rejected() {
        let cases: Vec<fn(&mut SweepConfig)> = vec![
            |c| c.sizes.clear(),
            |c| c.sizes.push(0),
            |c| c.iterations = 0,
            |c| c.samples_per_size = 0,
            |c| c.eviction_bytes = 0,
            |c| c.batch_size = 0,
        ];
        for tweak in cases {
            let mut config = SweepConfig::default();
            tweak(&mut config);
            assert!(matches!(
                config.validate(),
                Err(ProfilerError::InvalidConfig(_))
            ));
        }
    }
}
