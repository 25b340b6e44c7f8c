//! Chunk codecs for bundle content
//!
//! Every chunk is compressed on its own so that any chunk can be decoded
//! without touching its neighbours. The container never talks to an algorithm
//! directly: it asks a [`Codec`] for a [`ChunkCoder`] configured for one
//! operation (chunk size, algorithm, level, encode or decode-only) and drops it
//! when the operation ends.
//!
//! **Algorithms**:
//! - `None` (id 0): chunks are stored verbatim
//! - `Lz4` (id 1): LZ4 block format, level is ignored
//! - `Zstd` (id 2): Zstandard frames, default for new bundles

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default Zstd level used when the caller does not pick one
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Compression algorithm recorded in the bundle header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u32)]
pub enum Compressor {
    /// Stored without compression
    None = 0,
    /// LZ4 block compression (fast, moderate ratio)
    Lz4 = 1,
    /// Zstd compression (slower, better ratio)
    #[default]
    Zstd = 2,
}

impl Compressor {
    /// Convert from the on-disk identifier
    pub fn from_id(id: u32) -> Option<Self> {
        match id {
            0 => Some(Compressor::None),
            1 => Some(Compressor::Lz4),
            2 => Some(Compressor::Zstd),
            _ => None,
        }
    }

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Compressor::None => "none",
            Compressor::Lz4 => "lz4",
            Compressor::Zstd => "zstd",
        }
    }
}

impl std::str::FromStr for Compressor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "store" => Ok(Compressor::None),
            "lz4" => Ok(Compressor::Lz4),
            "zstd" => Ok(Compressor::Zstd),
            other => Err(format!("unknown compressor '{}'", other)),
        }
    }
}

/// What a configured coder is allowed to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecMode {
    Encode,
    DecodeOnly,
}

/// Per-operation codec setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    pub chunk_size: usize,
    pub compressor: Compressor,
    pub level: i32,
    pub mode: CodecMode,
}

impl CodecParams {
    pub fn decode(chunk_size: usize, compressor: Compressor) -> Self {
        CodecParams {
            chunk_size,
            compressor,
            level: DEFAULT_COMPRESSION_LEVEL,
            mode: CodecMode::DecodeOnly,
        }
    }

    pub fn encode(chunk_size: usize, compressor: Compressor, level: i32) -> Self {
        CodecParams {
            chunk_size,
            compressor,
            level,
            mode: CodecMode::Encode,
        }
    }
}

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("{compressor} {operation} failed: {message}")]
    Failed {
        compressor: &'static str,
        operation: &'static str,
        message: String,
    },

    #[error("{0} coder was configured decode-only")]
    DecodeOnly(&'static str),

    #[error("exact length {len} exceeds source of {available} bytes")]
    ExactLength { len: usize, available: usize },
}

impl CodecError {
    fn failed(compressor: Compressor, operation: &'static str, err: impl ToString) -> Self {
        CodecError::Failed {
            compressor: compressor.name(),
            operation,
            message: err.to_string(),
        }
    }
}

/// Source of configured chunk coders
///
/// Implementations must be shareable across threads; the coders they hand out
/// are used by one operation at a time.
pub trait Codec: Send + Sync {
    fn configure(&self, params: &CodecParams) -> Result<Box<dyn ChunkCoder>, CodecError>;
}

/// Encoder/decoder for a single operation
pub trait ChunkCoder {
    /// Compress one full chunk
    fn encode(&mut self, src: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Compress the first `len` bytes of `src` (the final, possibly short chunk)
    fn encode_exact(&mut self, src: &[u8], len: usize) -> Result<Vec<u8>, CodecError> {
        if len > src.len() {
            return Err(CodecError::ExactLength {
                len,
                available: src.len(),
            });
        }
        self.encode(&src[..len])
    }

    /// Decompress `compressed` into `dst`, returning the number of bytes produced
    fn decode(&mut self, compressed: &[u8], dst: &mut [u8]) -> Result<usize, CodecError>;

    /// Upper bound on the compressed size of one chunk
    fn max_compressed_buffer_size(&self) -> usize;
}

/// Codec backed by the built-in algorithms
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardCodec;

impl Codec for StandardCodec {
    fn configure(&self, params: &CodecParams) -> Result<Box<dyn ChunkCoder>, CodecError> {
        let encode = params.mode == CodecMode::Encode;
        match params.compressor {
            Compressor::None => Ok(Box::new(StoreCoder {
                chunk_size: params.chunk_size,
                encode,
            })),
            Compressor::Lz4 => Ok(Box::new(Lz4Coder {
                chunk_size: params.chunk_size,
                encode,
            })),
            Compressor::Zstd => {
                let compressor = if encode {
                    Some(
                        zstd::bulk::Compressor::new(params.level)
                            .map_err(|e| CodecError::failed(Compressor::Zstd, "init", e))?,
                    )
                } else {
                    None
                };
                let decompressor = zstd::bulk::Decompressor::new()
                    .map_err(|e| CodecError::failed(Compressor::Zstd, "init", e))?;

                Ok(Box::new(ZstdCoder {
                    chunk_size: params.chunk_size,
                    compressor,
                    decompressor,
                }))
            }
        }
    }
}

struct StoreCoder {
    chunk_size: usize,
    encode: bool,
}

impl ChunkCoder for StoreCoder {
    fn encode(&mut self, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        if !self.encode {
            return Err(CodecError::DecodeOnly(Compressor::None.name()));
        }
        Ok(src.to_vec())
    }

    fn decode(&mut self, compressed: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        // A stored chunk that does not fit is reported by its real length.
        let n = compressed.len().min(dst.len());
        dst[..n].copy_from_slice(&compressed[..n]);
        Ok(compressed.len())
    }

    fn max_compressed_buffer_size(&self) -> usize {
        self.chunk_size
    }
}

struct Lz4Coder {
    chunk_size: usize,
    encode: bool,
}

impl ChunkCoder for Lz4Coder {
    fn encode(&mut self, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        if !self.encode {
            return Err(CodecError::DecodeOnly(Compressor::Lz4.name()));
        }
        Ok(lz4_flex::block::compress(src))
    }

    fn decode(&mut self, compressed: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        lz4_flex::block::decompress_into(compressed, dst)
            .map_err(|e| CodecError::failed(Compressor::Lz4, "decompression", e))
    }

    fn max_compressed_buffer_size(&self) -> usize {
        lz4_flex::block::get_maximum_output_size(self.chunk_size)
    }
}

struct ZstdCoder {
    chunk_size: usize,
    compressor: Option<zstd::bulk::Compressor<'static>>,
    decompressor: zstd::bulk::Decompressor<'static>,
}

impl ChunkCoder for ZstdCoder {
    fn encode(&mut self, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        let compressor = self
            .compressor
            .as_mut()
            .ok_or(CodecError::DecodeOnly(Compressor::Zstd.name()))?;
        compressor
            .compress(src)
            .map_err(|e| CodecError::failed(Compressor::Zstd, "compression", e))
    }

    fn decode(&mut self, compressed: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        self.decompressor
            .decompress_to_buffer(compressed, dst)
            .map_err(|e| CodecError::failed(Compressor::Zstd, "decompression", e))
    }

    fn max_compressed_buffer_size(&self) -> usize {
        zstd::zstd_safe::compress_bound(self.chunk_size)
    }
}
