//! Cache eviction by brute force: stream through a private buffer larger than the last-level
//! cache so nothing from the previous sample survives in any level.
use crate::error::{ProfilerError, Result};
use crate::{CACHE_LINE_SIZE, format_size};
use log::debug;
use std::hint::black_box;

/// 32 MiB flushes most client L3 caches
pub const DEFAULT_EVICTION_BYTES: usize = 32 * 1024 * 1024;

/// Displaces the working set from every cache level before a sample is warmed and timed
pub trait CacheEvictor {
    fn evict(&self) -> Result<()>;

    /// Bytes streamed per eviction
    fn bytes(&self) -> usize;
}

#[derive(Clone, Copy, Debug)]
pub struct Evictor {
    bytes: usize,
}

impl Default for Evictor {
    fn default() -> Self {
        Evictor::new(DEFAULT_EVICTION_BYTES)
    }
}

impl Evictor {
    pub fn new(bytes: usize) -> Self {
        Evictor { bytes }
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Allocate a fresh buffer, write every byte, then touch and read back every line.
    /// The buffer is released before returning.
    #[inline(never)]
    pub fn evict(&self) -> Result<()> {
        let mut buffer: Vec<u8> = Vec::new();
        buffer
            .try_reserve_exact(self.bytes)
            .map_err(|_| ProfilerError::Allocation { bytes: self.bytes })?;
        buffer.resize(self.bytes, 0);

        for (i, line) in buffer.chunks_mut(CACHE_LINE_SIZE).enumerate() {
            line[0] = i as u8;
        }
        // keep the writes observable so the loop below can't be folded into them
        let buffer = black_box(buffer);

        let mut acc = 0u8;
        for line in buffer.chunks(CACHE_LINE_SIZE) {
            acc = acc.wrapping_add(line[0]);
        }
        black_box(acc);

        debug!("Evicted caches with {} buffer", format_size(self.bytes as f32));
        Ok(())
    }
}

impl CacheEvictor for Evictor {
    fn evict(&self) -> Result<()> {
        Evictor::evict(self)
    }

    fn bytes(&self) -> usize {
        self.bytes
    }
}
