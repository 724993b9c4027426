//! # Chain
//!
//! A pointer-chase chain is a contiguous arena of cache-line-sized nodes whose `next` links form
//! one cycle through every node in shuffled order. Walking it touches exactly one new line per
//! step, and since the address delta between steps is random, stride and pattern prefetchers
//! have nothing to lock on to: each step pays the full latency of whatever level holds the line.
//!
//! Links are arena indices rather than addresses, so the chain is an ordinary owned `Vec` that is
//! released in one piece when dropped.
use crate::error::{ProfilerError, Result};
use crate::CACHE_LINE_SIZE;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::mem::size_of;

/// One cache line: a forward link plus padding out to the end of the line
#[derive(Clone, Copy, Debug)]
#[repr(C, align(64))]
pub struct CacheLineNode {
    next: usize,
    _pad: [u8; CACHE_LINE_SIZE - size_of::<usize>()],
}

const _: () = assert!(size_of::<CacheLineNode>() == CACHE_LINE_SIZE);

impl CacheLineNode {
    const EMPTY: CacheLineNode = CacheLineNode {
        next: 0,
        _pad: [0; CACHE_LINE_SIZE - size_of::<usize>()],
    };
}

/// Randomized single-cycle pointer chain confined to a byte footprint
#[derive(Debug)]
pub struct Chain {
    nodes: Vec<CacheLineNode>,
    head: usize,
}

impl Chain {
    /// Number of nodes a chain of `target_bytes` holds
    pub fn node_count_for(target_bytes: usize) -> usize {
        (target_bytes / CACHE_LINE_SIZE).max(1)
    }

    /// Build a chain covering `target_bytes`, shuffled with `rng`
    pub fn build<R: Rng + ?Sized>(target_bytes: usize, rng: &mut R) -> Result<Self> {
        if target_bytes == 0 {
            return Err(ProfilerError::EmptyWorkingSet);
        }
        let n = Self::node_count_for(target_bytes);

        let mut nodes: Vec<CacheLineNode> = Vec::new();
        nodes
            .try_reserve_exact(n)
            .map_err(|_| ProfilerError::Allocation {
                bytes: n * CACHE_LINE_SIZE,
            })?;
        nodes.resize(n, CacheLineNode::EMPTY);

        let mut order: Vec<usize> = Vec::new();
        order
            .try_reserve_exact(n)
            .map_err(|_| ProfilerError::Allocation {
                bytes: n * size_of::<usize>(),
            })?;
        order.extend(0..n);
        order.shuffle(rng);

        for pair in order.windows(2) {
            nodes[pair[0]].next = pair[1];
        }
        // close the cycle
        nodes[order[n - 1]].next = order[0];

        Ok(Chain {
            nodes,
            head: order[0],
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Bytes actually spanned by the nodes
    pub fn footprint_bytes(&self) -> usize {
        self.nodes.len() * CACHE_LINE_SIZE
    }

    /// Index the traversal starts from
    pub fn head(&self) -> usize {
        self.head
    }

    /// Successor of node `idx`
    pub fn next(&self, idx: usize) -> usize {
        self.nodes[idx].next
    }

    /// Raw view of the arena for the timed loops. Every `next` is `< self.len()`.
    pub(crate) fn as_ptr(&self) -> *const CacheLineNode {
        self.nodes.as_ptr()
    }

    /// Walk from `start` until a node repeats. Returns the number of distinct nodes seen, or
    /// `None` if the walk re-entered at some node other than `start`.
    pub fn cycle_len_from(&self, start: usize) -> Option<usize> {
        let mut visited = HashSet::with_capacity(self.len());
        let mut idx = start;
        while visited.insert(idx) {
            idx = self.next(idx);
        }
        (idx == start).then_some(visited.len())
    }
}

/// Read `next` from a node through the raw arena pointer
///
/// # Safety
/// `idx` must be a valid index into the arena behind `base`.
#[inline(always)]
pub(crate) unsafe fn step(base: *const CacheLineNode, idx: usize) -> usize {
    unsafe { (*base.add(idx)).next }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn node_is_one_line() {
        assert_eq!(size_of::<CacheLineNode>(), 64);
        assert_eq!(std::mem::align_of::<CacheLineNode>(), 64);
    }

    #[test]
    fn arena_is_line_aligned() {
        let chain = Chain::build(4096, &mut SmallRng::seed_from_u64(7)).unwrap();
        assert_eq!(chain.as_ptr() as usize % CACHE_LINE_SIZE, 0);
    }

    #[test]
    fn sub_line_footprint_gets_one_self_linked_node() {
        let chain = Chain::build(10, &mut SmallRng::seed_from_u64(1)).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain.next(0), 0);
        assert_eq!(chain.cycle_len_from(0), Some(1));
    }

    #[test]
    fn zero_footprint_is_rejected() {
        let err = Chain::build(0, &mut SmallRng::seed_from_u64(1)).unwrap_err();
        assert!(matches!(err, ProfilerError::EmptyWorkingSet));
    }

    #[test]
    fn partial_trailing_line_is_dropped() {
        let chain = Chain::build(64 * 10 + 63, &mut SmallRng::seed_from_u64(3)).unwrap();
        assert_eq!(chain.len(), 10);
        assert_eq!(chain.footprint_bytes(), 640);
    }

    #[test]
    fn different_seeds_both_form_single_cycle() {
        let a = Chain::build(32 * 1024, &mut SmallRng::seed_from_u64(11)).unwrap();
        let b = Chain::build(32 * 1024, &mut SmallRng::seed_from_u64(12)).unwrap();
        assert_eq!(a.cycle_len_from(a.head()), Some(512));
        assert_eq!(b.cycle_len_from(b.head()), Some(512));
        // same structure, different order
        let walk = |chain: &Chain| {
            let mut idx = chain.head();
            (0..8)
                .map(|_| {
                    idx = chain.next(idx);
                    idx
                })
                .collect::<Vec<_>>()
        };
        assert_ne!(walk(&a), walk(&b));
    }

    #[test]
    fn successor_is_not_a_constant_stride() {
        let chain = Chain::build(64 * 1024, &mut SmallRng::seed_from_u64(5)).unwrap();
        let mut idx = chain.head();
        let mut deltas = HashSet::new();
        for _ in 0..64 {
            let next = chain.next(idx);
            deltas.insert(next as isize - idx as isize);
            idx = next;
        }
        assert!(deltas.len() > 1);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn every_node_on_one_cycle(bytes in 1usize..(256 * 1024), seed in any::<u64>()) {
                let chain = Chain::build(bytes, &mut SmallRng::seed_from_u64(seed)).unwrap();
                let n = Chain::node_count_for(bytes);
                prop_assert_eq!(chain.len(), n);
                prop_assert_eq!(chain.cycle_len_from(chain.head()), Some(n));
                // any start node closes the same cycle
                let start = (seed as usize) % n;
                prop_assert_eq!(chain.cycle_len_from(start), Some(n));
            }
        }
    }
}
