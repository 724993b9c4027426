//! # Sweep
//!
//! Drives the measurement protocol across working-set sizes. Every sample of every size runs the
//! same strictly sequential steps on a freshly allocated working set:
//!
//! ```text
//! Build -> Evict -> Warm -> Measure -> Release
//! ```
//!
//! Samples are reduced to their median, which shrugs off the occasional interrupt or context
//! switch that would drag a mean upward. Sizes run in ascending order and never interleave.
use crate::affinity::{self, AffinityControl, CoreAffinity};
use crate::config::SweepConfig;
use crate::error::{ProfilerError, Result};
use crate::evict::{CacheEvictor, Evictor};
use crate::harness::{Harness, TimedHarness};
use crate::workset::WorkingSet;
use crate::{CACHE_LINE_SIZE, format_size, timer, warmup};
use log::{debug, info, warn};
use rand::SeedableRng;
use rand::rngs::SmallRng;

/// Reduced measurement for one working-set size
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizeResult {
    pub size_bytes: usize,
    /// Median of the accepted samples, ns per access
    pub latency_ns: f64,
    /// Cache-line bytes moved per ns at that latency
    pub throughput_bytes_per_ns: f64,
    /// Samples that made it into the median
    pub samples: usize,
    /// Set when a sample was dropped after its retry also failed
    pub degraded: bool,
}

impl SizeResult {
    /// Build from a median latency. Rejects non-positive or non-finite latencies.
    pub fn from_median(
        size_bytes: usize,
        latency_ns: f64,
        samples: usize,
        degraded: bool,
    ) -> Result<Self> {
        if !(latency_ns.is_finite() && latency_ns > 0.0) {
            return Err(ProfilerError::TimerResolution {
                size_bytes,
                elapsed_ns: 0,
                granularity_ns: timer::granularity().as_nanos(),
            });
        }
        Ok(SizeResult {
            size_bytes,
            latency_ns,
            throughput_bytes_per_ns: CACHE_LINE_SIZE as f64 / latency_ns,
            samples,
            degraded,
        })
    }

    pub fn size_kb(&self) -> usize {
        self.size_bytes / 1024
    }

    /// 1 byte/ns == 1000 MB/s
    pub fn throughput_mbps(&self) -> f64 {
        self.throughput_bytes_per_ns * 1000.0
    }
}

/// Read-only view of results as each size completes
pub trait ProgressObserver {
    fn on_result(&mut self, result: &SizeResult);
}

impl ProgressObserver for () {
    fn on_result(&mut self, _result: &SizeResult) {}
}

impl<F: FnMut(&SizeResult)> ProgressObserver for F {
    fn on_result(&mut self, result: &SizeResult) {
        self(result)
    }
}

/// Never blocks the measuring thread; a full ring drops the row
impl ProgressObserver for rtrb::Producer<SizeResult> {
    fn on_result(&mut self, result: &SizeResult) {
        if self.push(*result).is_err() {
            warn!(
                "Progress queue full, dropping row for {}",
                format_size(result.size_bytes as f32)
            );
        }
    }
}

/// Median of `samples` (upper median for even counts). `None` when empty.
pub fn median(samples: &mut [f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_by(f64::total_cmp);
    Some(samples[samples.len() / 2])
}

/// Owns the per-run collaborators: harness, evictor, RNG and affinity capability
pub struct Sweep<H: Harness = TimedHarness> {
    config: SweepConfig,
    harness: H,
    evictor: Box<dyn CacheEvictor>,
    rng: SmallRng,
    affinity: Box<dyn AffinityControl>,
}

impl Sweep<TimedHarness> {
    /// Production sweep: wall-clock harness and `core_affinity` pinning
    pub fn new(config: SweepConfig) -> Self {
        let harness = TimedHarness::new(config.batch_size);
        Sweep::with_harness(config, harness)
    }
}

impl<H: Harness> Sweep<H> {
    pub fn with_harness(config: SweepConfig, harness: H) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_rng(&mut rand::rng()),
        };
        Sweep {
            evictor: Box::new(Evictor::new(config.eviction_bytes)),
            config,
            harness,
            rng,
            affinity: Box::new(CoreAffinity),
        }
    }

    /// Swap the affinity capability, e.g. for `NoAffinity` on platforms without it
    pub fn with_affinity(mut self, affinity: Box<dyn AffinityControl>) -> Self {
        self.affinity = affinity;
        self
    }

    /// Swap the cache evictor run before every sample
    pub fn with_evictor(mut self, evictor: Box<dyn CacheEvictor>) -> Self {
        self.evictor = evictor;
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run the configured sizes and sample count
    pub fn run_configured(
        &mut self,
        observer: &mut dyn ProgressObserver,
    ) -> Result<Vec<SizeResult>> {
        let sizes = self.config.sizes.clone();
        let samples = self.config.samples_per_size;
        self.run(&sizes, samples, observer)
    }

    /// Measure each of `sizes` (sorted ascending, duplicates dropped) `samples_per_size` times,
    /// reporting every reduced result to `observer` as soon as it is ready.
    pub fn run(
        &mut self,
        sizes: &[usize],
        samples_per_size: usize,
        observer: &mut dyn ProgressObserver,
    ) -> Result<Vec<SizeResult>> {
        let mut sizes = sizes.to_vec();
        sizes.sort_unstable();
        sizes.dedup();

        let mut config = self.config.clone();
        config.sizes = sizes.clone();
        config.samples_per_size = samples_per_size;
        config.validate()?;

        self.prepare_thread(&sizes);

        let mut results = Vec::with_capacity(sizes.len());
        for &size in &sizes {
            let result = self.run_size(size, samples_per_size)?;
            observer.on_result(&result);
            results.push(result);
        }

        info!("Sweep complete: {} sizes measured", results.len());
        Ok(results)
    }

    fn prepare_thread(&self, sizes: &[usize]) {
        if let Some(core) = self.config.core {
            affinity::request_pin(self.affinity.as_ref(), core);
        }
        affinity::raise_priority();

        let largest = sizes.last().copied().unwrap_or(0);
        if self.evictor.bytes() <= largest {
            warn!(
                "Eviction buffer ({}) is not larger than the largest working set ({}), \
                 eviction may be incomplete",
                format_size(self.evictor.bytes() as f32),
                format_size(largest as f32)
            );
        }
    }

    /// All repetitions for one size, reduced to its median
    fn run_size(&mut self, size: usize, samples_per_size: usize) -> Result<SizeResult> {
        let mut latencies = Vec::with_capacity(samples_per_size);
        let mut degraded = false;

        for sample in 0..samples_per_size {
            match self.sample_with_retry(size) {
                Ok(latency) => latencies.push(latency),
                Err(err @ ProfilerError::TimerResolution { .. }) => {
                    warn!(
                        "Dropping sample {} of {}: {}",
                        sample,
                        format_size(size as f32),
                        err
                    );
                    degraded = true;
                }
                Err(err) => return Err(err),
            }
        }

        let accepted = latencies.len();
        let Some(latency) = median(&mut latencies) else {
            return Err(ProfilerError::TimerResolution {
                size_bytes: size,
                elapsed_ns: 0,
                granularity_ns: timer::granularity().as_nanos(),
            });
        };
        debug!(
            "{}: median {:.2} ns over {} samples",
            format_size(size as f32),
            latency,
            accepted
        );
        SizeResult::from_median(size, latency, accepted, degraded)
    }

    /// One sample, retried once on a timer failure
    fn sample_with_retry(&mut self, size: usize) -> Result<f64> {
        match self.sample(size) {
            Err(ProfilerError::TimerResolution { .. }) => {
                debug!("Timer failure at {}, retrying sample", format_size(size as f32));
                self.sample(size)
            }
            other => other,
        }
    }

    /// Build -> Evict -> Warm -> Measure -> Release
    fn sample(&mut self, size: usize) -> Result<f64> {
        let mut set = WorkingSet::build(
            size,
            self.config.batch_threshold_bytes,
            self.config.batch_size,
            &mut self.rng,
        )?;
        self.evictor.evict()?;
        warmup::warm(&mut set);
        let latency = self.harness.measure(&set, self.config.iterations)?;
        drop(set);

        if !(latency.is_finite() && latency > 0.0) {
            return Err(ProfilerError::TimerResolution {
                size_bytes: size,
                elapsed_ns: 0,
                granularity_ns: timer::granularity().as_nanos(),
            });
        }
        Ok(latency)
    }
}
