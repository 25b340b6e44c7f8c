//! Whole-content decoded chunk cache
//!
//! A bundle either has no cache or one buffer of exactly `uncompressed_size`
//! bytes with a validity flag per chunk. Decoded chunks land at their absolute
//! logical offset, so repeated range reads decode each chunk at most once
//! until the cache is invalidated.

use tracing::debug;

#[derive(Debug, Default)]
enum CacheState {
    #[default]
    Uncached,
    Cached {
        buffer: Vec<u8>,
        valid: Vec<bool>,
    },
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Chunks served from the cache without decoding
    pub hits: u64,
    /// Chunks decoded into the cache
    pub decodes: u64,
    /// Chunks currently marked valid
    pub resident_chunks: usize,
    /// Size of the allocated buffer (0 when uncached)
    pub allocated_bytes: usize,
}

impl CacheStats {
    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.decodes;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Borrowed view of an allocated cache
pub(crate) struct CacheSlots<'a> {
    pub buffer: &'a mut [u8],
    pub valid: &'a mut [bool],
}

#[derive(Debug, Default)]
pub(crate) struct ChunkCache {
    state: CacheState,
    hits: u64,
    decodes: u64,
}

impl ChunkCache {
    pub fn new() -> Self {
        ChunkCache::default()
    }

    pub fn is_allocated(&self) -> bool {
        matches!(self.state, CacheState::Cached { .. })
    }

    /// Allocate the buffer on first use and hand out both tables
    pub fn slots(&mut self, size: usize, chunk_count: usize) -> CacheSlots<'_> {
        if !self.is_allocated() {
            debug!(size, chunk_count, "Allocating chunk cache");
            self.state = CacheState::Cached {
                buffer: vec![0u8; size],
                valid: vec![false; chunk_count],
            };
        }

        match &mut self.state {
            CacheState::Cached { buffer, valid } => CacheSlots { buffer, valid },
            CacheState::Uncached => unreachable!("cache allocated above"),
        }
    }

    /// Allocated buffer, if any
    pub fn buffer(&self) -> Option<&[u8]> {
        match &self.state {
            CacheState::Cached { buffer, .. } => Some(buffer),
            CacheState::Uncached => None,
        }
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_decode(&mut self) {
        self.decodes += 1;
    }

    /// Drop buffer and validity table
    pub fn invalidate(&mut self) {
        if self.is_allocated() {
            debug!("Invalidating chunk cache");
        }
        self.state = CacheState::Uncached;
    }

    pub fn stats(&self) -> CacheStats {
        let (resident_chunks, allocated_bytes) = match &self.state {
            CacheState::Cached { buffer, valid } => {
                (valid.iter().filter(|&&v| v).count(), buffer.len())
            }
            CacheState::Uncached => (0, 0),
        };

        CacheStats {
            hits: self.hits,
            decodes: self.decodes,
            resident_chunks,
            allocated_bytes,
        }
    }
}
