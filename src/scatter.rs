//! Raw line buffer with precomputed random offsets. Used instead of a
//! [`Chain`](crate::chain::Chain) once working sets reach main-memory scale, where building a
//! linked chain would cost more than measuring it.
use crate::error::{ProfilerError, Result};
use crate::CACHE_LINE_SIZE;
use rand::Rng;
use std::mem::size_of;

/// Upper bound on stored offsets; batches cycle through them
const MAX_OFFSETS: usize = 1 << 16;

/// One raw cache line
#[derive(Clone, Copy, Debug)]
#[repr(C, align(64))]
pub struct Line(pub [u64; CACHE_LINE_SIZE / size_of::<u64>()]);

const _: () = assert!(size_of::<Line>() == CACHE_LINE_SIZE);

#[derive(Debug)]
pub struct ScatteredBuffer {
    lines: Vec<Line>,
    offsets: Vec<usize>,
}

impl ScatteredBuffer {
    /// Allocate `bytes` worth of zeroed lines and draw `min(lines, MAX_OFFSETS)` random line
    /// indices, at least `batch_size` of them.
    pub fn build<R: Rng>(bytes: usize, batch_size: usize, rng: &mut R) -> Result<Self> {
        if bytes == 0 {
            return Err(ProfilerError::EmptyWorkingSet);
        }
        let n = (bytes / CACHE_LINE_SIZE).max(1);

        let mut lines: Vec<Line> = Vec::new();
        lines
            .try_reserve_exact(n)
            .map_err(|_| ProfilerError::Allocation {
                bytes: n * CACHE_LINE_SIZE,
            })?;
        lines.resize(n, Line([0; CACHE_LINE_SIZE / size_of::<u64>()]));

        let count = n.min(MAX_OFFSETS).max(batch_size.max(1));
        let mut offsets: Vec<usize> = Vec::new();
        offsets
            .try_reserve_exact(count)
            .map_err(|_| ProfilerError::Allocation {
                bytes: count * size_of::<usize>(),
            })?;
        offsets.extend((0..count).map(|_| rng.random_range(0..n)));

        Ok(ScatteredBuffer { lines, offsets })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn footprint_bytes(&self) -> usize {
        self.lines.len() * CACHE_LINE_SIZE
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn lines_mut(&mut self) -> &mut [Line] {
        &mut self.lines
    }

    /// Precomputed line indices, each `< self.len()`
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn offsets_stay_in_bounds() {
        let buf = ScatteredBuffer::build(1 << 20, 256, &mut SmallRng::seed_from_u64(9)).unwrap();
        assert_eq!(buf.len(), (1 << 20) / 64);
        assert!(buf.offsets().iter().all(|&o| o < buf.len()));
        assert_eq!(buf.offsets().len(), buf.len().min(MAX_OFFSETS));
    }

    #[test]
    fn small_buffer_still_fills_a_batch() {
        let buf = ScatteredBuffer::build(640, 128, &mut SmallRng::seed_from_u64(9)).unwrap();
        assert_eq!(buf.len(), 10);
        assert_eq!(buf.offsets().len(), 128);
        assert!(buf.offsets().iter().all(|&o| o < 10));
    }

    #[test]
    fn lines_are_aligned() {
        let buf = ScatteredBuffer::build(4096, 16, &mut SmallRng::seed_from_u64(2)).unwrap();
        assert_eq!(buf.lines().as_ptr() as usize % CACHE_LINE_SIZE, 0);
    }
}
