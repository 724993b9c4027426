//! Re-prime the caches with a working set right before it is timed, so the measurement sees the
//! set resident in the smallest level that can hold it rather than in DRAM.
use crate::chain::{self, Chain};
use crate::scatter::Line;
use crate::workset::WorkingSet;
use std::hint::black_box;

/// Walk `steps` links from the chain head. Returns the index the walk ended on.
#[inline(never)]
pub fn warm_chain(chain: &Chain, steps: usize) -> usize {
    let base = chain.as_ptr();
    let mut idx = chain.head();
    for _ in 0..steps {
        // SAFETY: chain links are always in bounds of the arena
        idx = black_box(unsafe { chain::step(base, idx) });
    }
    black_box(idx)
}

/// Touch every line once in ascending address order
#[inline(never)]
pub fn warm_sequential(lines: &mut [Line]) {
    for line in lines.iter_mut() {
        line.0[0] = black_box(line.0[0]);
    }
    black_box(lines);
}

/// Warm whichever kind of working set a sample is about to measure
pub fn warm(set: &mut WorkingSet) {
    match set {
        WorkingSet::Chain(chain) => {
            warm_chain(chain, chain.len());
        }
        WorkingSet::Scattered(buf) => warm_sequential(buf.lines_mut()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn full_traversal_returns_to_head() {
        let chain = Chain::build(16 * 1024, &mut SmallRng::seed_from_u64(4)).unwrap();
        assert_eq!(warm_chain(&chain, chain.len()), chain.head());
    }

    #[test]
    fn partial_traversal_matches_manual_walk() {
        let chain = Chain::build(8 * 1024, &mut SmallRng::seed_from_u64(8)).unwrap();
        let mut idx = chain.head();
        for _ in 0..17 {
            idx = chain.next(idx);
        }
        assert_eq!(warm_chain(&chain, 17), idx);
    }

    #[test]
    fn sequential_warm_leaves_contents_unchanged() {
        let mut lines = vec![Line([3; 8]); 32];
        warm_sequential(&mut lines);
        assert!(lines.iter().all(|l| l.0 == [3; 8]));
    }
}
