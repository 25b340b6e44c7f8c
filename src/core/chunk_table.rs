//! Chunk size table
//!
//! One little-endian `i32` compressed length per chunk, stored right after the
//! header. The prefix sum of the first `k` entries is the offset of chunk `k`
//! inside the data region. There is no secondary index, so locating chunk `k`
//! walks `k` entries.

use crate::error::{BundleError, Result};
use crate::header::MAX_BUNDLE_SIZE;
use std::io::{Read, Write};
use std::ops::Range;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkTable {
    sizes: Vec<u32>,
}

impl ChunkTable {
    pub fn new() -> Self {
        ChunkTable { sizes: Vec::new() }
    }

    pub fn with_capacity(chunk_count: usize) -> Self {
        ChunkTable {
            sizes: Vec::with_capacity(chunk_count),
        }
    }

    /// Read `chunk_count` entries from the current stream position
    pub fn read_from<R: Read>(reader: &mut R, chunk_count: usize) -> Result<Self> {
        let mut raw = vec![0u8; chunk_count * 4];
        reader.read_exact(&mut raw)?;

        let mut sizes = Vec::with_capacity(chunk_count);
        for (index, entry) in raw.chunks_exact(4).enumerate() {
            let size = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
            if size as u64 > MAX_BUNDLE_SIZE {
                return Err(BundleError::InvalidHeader(format!(
                    "chunk {} has negative compressed length {:#x}",
                    index, size
                )));
            }
            sizes.push(size);
        }

        Ok(ChunkTable { sizes })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.sizes.len() * 4);
        for size in &self.sizes {
            bytes.extend_from_slice(&size.to_le_bytes());
        }
        bytes
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes())?;
        Ok(())
    }

    pub fn push(&mut self, compressed_len: u32) {
        self.sizes.push(compressed_len);
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }

    /// Compressed length of chunk `index`
    pub fn get(&self, index: usize) -> Option<u32> {
        self.sizes.get(index).copied()
    }

    /// Largest compressed length in the table, 0 when empty
    pub fn max_len(&self) -> u32 {
        self.sizes.iter().copied().max().unwrap_or(0)
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.sizes
    }

    /// Offset of chunk `index` relative to the start of the data region
    pub fn offset_of(&self, index: usize) -> u64 {
        self.sizes[..index].iter().map(|&s| s as u64).sum()
    }

    /// Sum of every compressed length
    pub fn total(&self) -> u64 {
        self.offset_of(self.sizes.len())
    }
}

/// Chunks touched by the byte range `offset..offset + length`
///
/// `length` must be non-zero; the end index is exclusive.
pub fn chunk_span(offset: u64, length: u64, chunk_size: u32) -> Range<usize> {
    let chunk_size = chunk_size as u64;
    let start = offset / chunk_size;
    let end = (offset + length).div_ceil(chunk_size);
    start as usize..end as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_prefix_offsets() {
        let mut table = ChunkTable::new();
        table.push(10);
        table.push(7);
        table.push(3);

        assert_eq!(table.offset_of(0), 0);
        assert_eq!(table.offset_of(1), 10);
        assert_eq!(table.offset_of(2), 17);
        assert_eq!(table.total(), 20);
        assert_eq!(table.get(1), Some(7));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_read_write_table() {
        let mut table = ChunkTable::with_capacity(2);
        table.push(0x0102_0304);
        table.push(5);

        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        assert_eq!(out, vec![4, 3, 2, 1, 5, 0, 0, 0]);

        let read = ChunkTable::read_from(&mut Cursor::new(out), 2).unwrap();
        assert_eq!(read, table);
    }

    #[test]
    fn test_read_short_table() {
        let result = ChunkTable::read_from(&mut Cursor::new(vec![1, 0, 0, 0]), 2);
        assert!(matches!(result, Err(BundleError::Io(_))));
    }

    #[test]
    fn test_read_negative_length() {
        let result = ChunkTable::read_from(&mut Cursor::new(vec![0xFF; 4]), 1);
        assert!(matches!(result, Err(BundleError::InvalidHeader(_))));
    }

    #[test]
    fn test_max_len() {
        let mut table = ChunkTable::new();
        assert_eq!(table.max_len(), 0);
        assert!(table.is_empty());

        table.push(7);
        table.push(19);
        table.push(3);
        assert_eq!(table.max_len(), 19);
        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1), Some(19));
        assert_eq!(table.get(3), None);
    }

    #[test]
    fn test_chunk_span() {
        // chunk_size 4, 10 bytes: chunks [0,4) [4,8) [8,10)
        assert_eq!(chunk_span(5, 3, 4), 1..2);
        assert_eq!(chunk_span(5, 4, 4), 1..3);
        assert_eq!(chunk_span(0, 10, 4), 0..3);
        assert_eq!(chunk_span(8, 2, 4), 2..3);
        assert_eq!(chunk_span(3, 1, 4), 0..1);
        assert_eq!(chunk_span(4, 4, 4), 1..2);
    }
}
