//! # Latency harness
//!
//! Times pointer-chasing traversals of a [`Chain`], or batches of dependent loads into a
//! [`ScatteredBuffer`], and reports nanoseconds per access. Every load's address depends on the
//! value of the previous load, so the CPU can't overlap misses and the result is a latency, not a
//! bandwidth.
use crate::chain::{self, Chain};
use crate::error::{ProfilerError, Result};
use crate::scatter::ScatteredBuffer;
use crate::sweep::median;
use crate::timer;
use crate::workset::WorkingSet;
use log::debug;
use std::hint::black_box;
use std::time::Instant;

/// Default accesses per timed batch for scattered working sets
pub const DEFAULT_BATCH_SIZE: usize = 1024;

/// Measures one sample of a prepared (evicted and warmed) working set
pub trait Harness {
    /// Returns nanoseconds per access. Never returns a zero or negative value: a measurement the
    /// timer couldn't resolve is an error.
    fn measure(&mut self, set: &WorkingSet, iterations: usize) -> Result<f64>;
}

/// Wall-clock harness backed by `Instant`
#[derive(Clone, Debug)]
pub struct TimedHarness {
    batch_size: usize,
}

impl Default for TimedHarness {
    fn default() -> Self {
        TimedHarness::new(DEFAULT_BATCH_SIZE)
    }
}

impl TimedHarness {
    pub fn new(batch_size: usize) -> Self {
        TimedHarness {
            batch_size: batch_size.max(1),
        }
    }
}

impl Harness for TimedHarness {
    fn measure(&mut self, set: &WorkingSet, iterations: usize) -> Result<f64> {
        if iterations == 0 {
            return Err(ProfilerError::InvalidConfig(
                "iterations must be non-zero".to_string(),
            ));
        }
        match set {
            WorkingSet::Chain(chain) => measure_chain(chain, iterations),
            WorkingSet::Scattered(buf) => measure_batches(buf, iterations, self.batch_size),
        }
    }
}

/// Chase `iterations` links and return the mean time per link
#[inline(never)]
pub fn measure_chain(chain: &Chain, iterations: usize) -> Result<f64> {
    let base = chain.as_ptr();
    let mut idx = chain.head();
    let unrolled = iterations / 8;
    let rest = iterations % 8;

    let start = Instant::now();

    // SAFETY (all steps below): chain links are always in bounds of the arena
    for _ in 0..unrolled {
        // Unroll 8x to reduce loop overhead relative to memory latency
        idx = unsafe { chain::step(base, idx) };
        idx = unsafe { chain::step(base, idx) };
        idx = unsafe { chain::step(base, idx) };
        idx = unsafe { chain::step(base, idx) };
        idx = unsafe { chain::step(base, idx) };
        idx = unsafe { chain::step(base, idx) };
        idx = unsafe { chain::step(base, idx) };
        idx = unsafe { chain::step(base, idx) };
    }
    for _ in 0..rest {
        idx = unsafe { chain::step(base, idx) };
    }

    let elapsed = start.elapsed();

    // Each step feeds the next, so consuming the last index keeps the whole walk alive
    black_box(idx);

    timer::per_access_ns(elapsed, iterations, chain.footprint_bytes())
}

/// Time `iterations` dependent loads in batches of `batch_size`, returning the median batch's
/// time per load
#[inline(never)]
pub fn measure_batches(buf: &ScatteredBuffer, iterations: usize, batch_size: usize) -> Result<f64> {
    let lines = buf.lines();
    let offsets = buf.offsets();
    let batch_size = batch_size.max(1);
    let batches = (iterations / batch_size).max(1);

    let mut per_batch = Vec::with_capacity(batches);
    let mut pos = 0usize;
    // always zero at runtime, but the compiler can't see that: it chains each load to the last
    let mut dep = 0usize;

    for _ in 0..batches {
        let start = Instant::now();
        for _ in 0..batch_size {
            dep = lines[offsets[pos] + dep].0[0] as usize;
            pos += 1;
            if pos == offsets.len() {
                pos = 0;
            }
        }
        let elapsed = start.elapsed();
        per_batch.push(timer::per_access_ns(
            elapsed,
            batch_size,
            buf.footprint_bytes(),
        ));
    }
    black_box(dep);

    median_resolved(per_batch)
}

/// Median of the batches the timer could resolve. Fails with the last timer error only when no
/// batch survives.
fn median_resolved(per_batch: Vec<Result<f64>>) -> Result<f64> {
    let total = per_batch.len();
    let mut resolved = Vec::with_capacity(total);
    let mut last_err = None;
    for batch in per_batch {
        match batch {
            Ok(latency) => resolved.push(latency),
            Err(err) => last_err = Some(err),
        }
    }
    if resolved.len() < total {
        debug!("Skipped {} of {} unresolved batches", total - resolved.len(), total);
    }
    match (median(&mut resolved), last_err) {
        (Some(latency), _) => Ok(latency),
        (None, Some(err)) => Err(err),
        (None, None) => Err(ProfilerError::InvalidConfig(
            "no batches to measure".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn chain_latency_is_positive() {
        let chain = Chain::build(16 * 1024, &mut SmallRng::seed_from_u64(1)).unwrap();
        let latency = measure_chain(&chain, 2_000_000).unwrap();
        assert!(latency > 0.0 && latency.is_finite());
    }

    #[test]
    fn unaligned_iteration_count_is_accepted() {
        let chain = Chain::build(4096, &mut SmallRng::seed_from_u64(2)).unwrap();
        assert!(measure_chain(&chain, 1_000_003).unwrap() > 0.0);
    }

    #[test]
    fn batched_latency_is_positive() {
        let buf = ScatteredBuffer::build(1 << 20, 512, &mut SmallRng::seed_from_u64(3)).unwrap();
        let latency = measure_batches(&buf, 512 * 64, 512).unwrap();
        assert!(latency > 0.0 && latency.is_finite());
    }

    fn unresolved(size_bytes: usize) -> ProfilerError {
        ProfilerError::TimerResolution {
            size_bytes,
            elapsed_ns: 0,
            granularity_ns: 20,
        }
    }

    #[test]
    fn unresolved_batch_is_skipped_not_fatal() {
        let batches = vec![Ok(90.0), Err(unresolved(1 << 26)), Ok(80.0), Ok(85.0)];
        assert_eq!(median_resolved(batches).unwrap(), 85.0);
    }

    #[test]
    fn all_batches_unresolved_is_a_timer_error() {
        let batches = vec![Err(unresolved(1 << 26)), Err(unresolved(1 << 26))];
        assert!(matches!(
            median_resolved(batches),
            Err(ProfilerError::TimerResolution { size_bytes, .. }) if size_bytes == 1 << 26
        ));
    }

    #[test]
    fn zero_iterations_rejected() {
        let chain = Chain::build(4096, &mut SmallRng::seed_from_u64(2)).unwrap();
        let err = TimedHarness::default()
            .measure(&WorkingSet::Chain(chain), 0)
            .unwrap_err();
        assert!(matches!(err, ProfilerError::InvalidConfig(_)));
    }
}
