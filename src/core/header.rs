//! Fixed 60-byte bundle header
//!
//! Every bundle starts with this record, followed by the chunk size table and
//! the compressed chunk stream. All fields are little-endian.
//!
//! ```text
//! offset 0   uncompressed_size      i32
//! offset 4   compressed_size        i32
//! offset 8   head_size              i32   chunk_count * 4 + 48
//! offset 12  compressor_id          i32
//! offset 16  flag                   i32   always 1
//! offset 20  uncompressed_size_64   i64   mirrors offset 0
//! offset 28  compressed_size_64     i64   mirrors offset 4
//! offset 36  chunk_count            i32
//! offset 40  chunk_size             i32
//! offset 44  reserved               i32 x 3
//! offset 56  padding                4 bytes
//! offset 60  chunk size table       i32 x chunk_count
//! ```

use crate::compression::Compressor;
use crate::error::{BundleError, Result};
use serde::Serialize;

/// On-disk size of the fixed header
pub const HEADER_SIZE: usize = 60;

/// Chunk size used for newly created bundles
pub const DEFAULT_CHUNK_SIZE: u32 = 262_144;

/// `head_size` counts the chunk table plus this many fixed bytes
pub const HEAD_SIZE_BASE: u32 = 48;

/// Value stored in the flag field on every write
pub const HEADER_FLAG: u32 = 1;

/// Largest logical or compressed size the 32-bit fields can carry
pub const MAX_BUNDLE_SIZE: u64 = i32::MAX as u64;

/// Bundle header
///
/// Sizes are kept as unsigned in memory; on disk they are signed 32-bit values
/// and anything above [`MAX_BUNDLE_SIZE`] is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Header {
    pub uncompressed_size: u32,
    pub compressed_size: u32,
    pub head_size: u32,
    pub compressor_id: u32,
    pub flag: u32,
    pub uncompressed_size_64: u64,
    pub compressed_size_64: u64,
    pub chunk_count: u32,
    pub chunk_size: u32,
    pub reserved: [u32; 3],
}

impl Header {
    /// Header of an empty bundle
    pub fn empty(chunk_size: u32, compressor: Compressor) -> Self {
        Header {
            uncompressed_size: 0,
            compressed_size: 0,
            head_size: HEAD_SIZE_BASE,
            compressor_id: compressor.id(),
            flag: HEADER_FLAG,
            uncompressed_size_64: 0,
            compressed_size_64: 0,
            chunk_count: 0,
            chunk_size,
            reserved: [0; 3],
        }
    }

    /// Number of chunks needed to hold `size` bytes at `chunk_size`
    pub fn chunks_for(size: u64, chunk_size: u32) -> u32 {
        if size == 0 {
            return 0;
        }
        size.div_ceil(chunk_size as u64) as u32
    }

    /// Rebuild the size fields for new content
    ///
    /// `compressed_size` is set separately once the chunks are encoded.
    pub fn resize(&mut self, uncompressed_size: u32) {
        let chunk_count = Self::chunks_for(uncompressed_size as u64, self.chunk_size);
        self.uncompressed_size = uncompressed_size;
        self.uncompressed_size_64 = uncompressed_size as u64;
        self.chunk_count = chunk_count;
        self.head_size = chunk_count * 4 + HEAD_SIZE_BASE;
        self.flag = HEADER_FLAG;
        self.reserved = [0; 3];
    }

    pub fn set_compressed_size(&mut self, compressed_size: u32) {
        self.compressed_size = compressed_size;
        self.compressed_size_64 = compressed_size as u64;
    }

    /// Compressor named by the header
    pub fn compressor(&self) -> Result<Compressor> {
        Compressor::from_id(self.compressor_id)
            .ok_or(BundleError::UnsupportedCompressor(self.compressor_id))
    }

    /// Header plus chunk size table
    pub fn header_region_len(&self) -> u64 {
        HEADER_SIZE as u64 + self.chunk_count as u64 * 4
    }

    /// Expected length of the whole backing stream
    pub fn total_len(&self) -> u64 {
        self.header_region_len() + self.compressed_size as u64
    }

    /// Logical size of the final chunk, 0 for an empty bundle
    pub fn last_chunk_size(&self) -> usize {
        if self.chunk_count == 0 {
            return 0;
        }
        self.uncompressed_size as usize - self.chunk_size as usize * (self.chunk_count as usize - 1)
    }

    /// Logical size of chunk `index`
    pub fn chunk_len(&self, index: usize) -> usize {
        if index + 1 == self.chunk_count as usize {
            self.last_chunk_size()
        } else {
            self.chunk_size as usize
        }
    }

    /// Check structural consistency of the fields
    pub fn validate(&self) -> Result<()> {
        if self.uncompressed_size as u64 > MAX_BUNDLE_SIZE
            || self.compressed_size as u64 > MAX_BUNDLE_SIZE
        {
            return Err(BundleError::InvalidHeader(format!(
                "negative size fields (uncompressed {:#x}, compressed {:#x})",
                self.uncompressed_size, self.compressed_size
            )));
        }

        if self.uncompressed_size_64 != self.uncompressed_size as u64 {
            return Err(BundleError::InvalidHeader(format!(
                "uncompressed size mismatch: {} vs 64-bit {}",
                self.uncompressed_size, self.uncompressed_size_64
            )));
        }

        if self.compressed_size_64 != self.compressed_size as u64 {
            return Err(BundleError::InvalidHeader(format!(
                "compressed size mismatch: {} vs 64-bit {}",
                self.compressed_size, self.compressed_size_64
            )));
        }

        if self.chunk_size as u64 > MAX_BUNDLE_SIZE {
            return Err(BundleError::InvalidHeader(format!(
                "negative chunk size {:#x}",
                self.chunk_size
            )));
        }

        let expected_head = self.chunk_count as u64 * 4 + HEAD_SIZE_BASE as u64;
        if self.head_size as u64 != expected_head {
            return Err(BundleError::InvalidHeader(format!(
                "head size {} does not match {} chunks (expected {})",
                self.head_size, self.chunk_count, expected_head
            )));
        }

        if self.chunk_count > 0 && self.chunk_size == 0 {
            return Err(BundleError::InvalidHeader(format!(
                "zero chunk size with {} chunks",
                self.chunk_count
            )));
        }

        if self.chunk_size > 0 {
            let expected = Self::chunks_for(self.uncompressed_size as u64, self.chunk_size);
            if self.chunk_count != expected {
                return Err(BundleError::InvalidHeader(format!(
                    "chunk count {} does not cover {} bytes at chunk size {} (expected {})",
                    self.chunk_count, self.uncompressed_size, self.chunk_size, expected
                )));
            }
        } else if self.uncompressed_size != 0 {
            return Err(BundleError::InvalidHeader(format!(
                "{} bytes of content with no chunks",
                self.uncompressed_size
            )));
        }

        self.compressor()?;

        Ok(())
    }

    /// Serialize header to bytes
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        let mut writer = FieldWriter::new(&mut bytes);

        writer.put_u32(self.uncompressed_size);
        writer.put_u32(self.compressed_size);
        writer.put_u32(self.head_size);
        writer.put_u32(self.compressor_id);
        writer.put_u32(self.flag);
        writer.put_u64(self.uncompressed_size_64);
        writer.put_u64(self.compressed_size_64);
        writer.put_u32(self.chunk_count);
        writer.put_u32(self.chunk_size);
        for reserved in self.reserved {
            writer.put_u32(reserved);
        }

        bytes
    }

    /// Deserialize header from bytes
    ///
    /// Only decodes; call [`Header::validate`] for consistency checks.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ensure_little_endian()?;

        if bytes.len() < HEADER_SIZE {
            return Err(BundleError::Truncated {
                expected: HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let mut reader = FieldReader::new(&bytes[..HEADER_SIZE]);

        Ok(Header {
            uncompressed_size: reader.u32(),
            compressed_size: reader.u32(),
            head_size: reader.u32(),
            compressor_id: reader.u32(),
            flag: reader.u32(),
            uncompressed_size_64: reader.u64(),
            compressed_size_64: reader.u64(),
            chunk_count: reader.u32(),
            chunk_size: reader.u32(),
            reserved: [reader.u32(), reader.u32(), reader.u32()],
        })
    }
}

/// The format is only defined for little-endian hosts
pub fn ensure_little_endian() -> Result<()> {
    if cfg!(target_endian = "big") {
        return Err(BundleError::UnsupportedFormat(
            "bundles can only be opened on little-endian hosts".to_string(),
        ));
    }
    Ok(())
}

struct FieldWriter<'a> {
    bytes: &'a mut [u8],
    offset: usize,
}

impl<'a> FieldWriter<'a> {
    fn new(bytes: &'a mut [u8]) -> Self {
        FieldWriter { bytes, offset: 0 }
    }

    fn put_u32(&mut self, value: u32) {
        self.bytes[self.offset..self.offset + 4].copy_from_slice(&value.to_le_bytes());
        self.offset += 4;
    }

    fn put_u64(&mut self, value: u64) {
        self.bytes[self.offset..self.offset + 8].copy_from_slice(&value.to_le_bytes());
        self.offset += 8;
    }
}

// Callers guarantee the slice covers every field read.
struct FieldReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> FieldReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        FieldReader { bytes, offset: 0 }
    }

    fn u32(&mut self) -> u32 {
        let mut field = [0u8; 4];
        field.copy_from_slice(&self.bytes[self.offset..self.offset + 4]);
        self.offset += 4;
        u32::from_le_bytes(field)
    }

    fn u64(&mut self) -> u64 {
        let mut field = [0u8; 8];
        field.copy_from_slice(&self.bytes[self.offset..self.offset + 8]);
        self.offset += 8;
        u64::from_le_bytes(field)
    }
}
