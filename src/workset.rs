use crate::chain::Chain;
use crate::error::Result;
use crate::scatter::ScatteredBuffer;
use rand::Rng;

/// The memory one sample measures. Owned by that sample and dropped with it.
#[derive(Debug)]
pub enum WorkingSet {
    Chain(Chain),
    Scattered(ScatteredBuffer),
}

impl WorkingSet {
    /// Pick the access structure for `bytes`: a pointer chain below `batch_threshold`, batched
    /// random offsets into a raw buffer at or above it.
    pub fn build<R: Rng>(
        bytes: usize,
        batch_threshold: usize,
        batch_size: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if bytes < batch_threshold {
            Ok(WorkingSet::Chain(Chain::build(bytes, rng)?))
        } else {
            Ok(WorkingSet::Scattered(ScatteredBuffer::build(
                bytes, batch_size, rng,
            )?))
        }
    }

    pub fn footprint_bytes(&self) -> usize {
        match self {
            WorkingSet::Chain(chain) => chain.footprint_bytes(),
            WorkingSet::Scattered(buf) => buf.footprint_bytes(),
        }
    }
}
