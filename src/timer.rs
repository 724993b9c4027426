//! Monotonic timer helpers. The clock's effective granularity is measured once per process and
//! used to reject timed regions too short to trust.
use crate::error::{ProfilerError, Result};
use log::debug;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static GRANULARITY: OnceLock<Duration> = OnceLock::new();

const CALIBRATION_ROUNDS: usize = 1_000;

/// Smallest non-zero step between consecutive `Instant::now()` reads
#[inline(never)]
fn calibrate_granularity() -> Duration {
    let mut best = Duration::MAX;
    for _ in 0..CALIBRATION_ROUNDS {
        let start = Instant::now();
        let mut now = Instant::now();
        while now == start {
            now = Instant::now();
        }
        best = best.min(now - start);
    }
    debug!("Timer granularity calibrated to {} ns", best.as_nanos());
    best
}

/// Clock granularity (cached after first call)
pub fn granularity() -> Duration {
    *GRANULARITY.get_or_init(calibrate_granularity)
}

/// Convert an elapsed span over `accesses` into ns per access, rejecting spans the clock can't
/// resolve and non-positive results.
pub fn per_access_ns(elapsed: Duration, accesses: usize, size_bytes: usize) -> Result<f64> {
    let granularity = granularity();
    let latency = elapsed.as_nanos() as f64 / accesses as f64;
    if elapsed.is_zero() || elapsed < granularity || !(latency.is_finite() && latency > 0.0) {
        return Err(ProfilerError::TimerResolution {
            size_bytes,
            elapsed_ns: elapsed.as_nanos(),
            granularity_ns: granularity.as_nanos(),
        });
    }
    Ok(latency)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn granularity_is_positive_and_stable() {
        let g = granularity();
        assert!(g > Duration::ZERO);
        assert_eq!(g, granularity());
    }

    #[test]
    fn zero_span_is_rejected() {
        let err = per_access_ns(Duration::ZERO, 1000, 4096).unwrap_err();
        assert!(matches!(
            err,
            ProfilerError::TimerResolution { size_bytes: 4096, elapsed_ns: 0, .. }
        ));
    }

    #[test]
    fn long_span_divides_evenly() {
        let latency = per_access_ns(Duration::from_millis(10), 5_000_000, 64).unwrap();
        assert!((latency - 2.0).abs() < 1e-12);
    }
}
