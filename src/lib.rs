//! # bundle-rs - Chunked, Compressed, Random-Access Bundles
//!
//! A bundle is the storage unit of a larger virtual file archive. It holds one
//! blob of logical content split into fixed-size chunks, each compressed on
//! its own, so that any byte range can be read by decoding only the chunks it
//! touches.
//!
//! - **Partial reads** of arbitrary byte ranges
//! - **Optional decoded cache**: each chunk decoded at most once between saves
//! - **Full rebuild on save**: recompress everything, truncate, rewrite header
//! - **Shared-stream locking**: safe to share across threads by construction
//! - **Pluggable codecs**: Zstd, LZ4 or stored chunks, or bring your own
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bundle_rs::{Bundle, BundleConfig, Result};
//!
//! # fn main() -> Result<()> {
//! // Create an empty bundle on disk
//! let bundle = Bundle::create_path("textures.bundle", &BundleConfig::default())?;
//!
//! // Replace its content
//! bundle.save(&vec![0xAB; 1024 * 1024], 3)?;
//!
//! // Read a range; only the chunks it touches are decoded
//! let slice = bundle.read_range(300_000, 64)?;
//! assert_eq!(slice.len(), 64);
//!
//! // Repeated reads through the cache decode each chunk once
//! let checksum = bundle.read_range_cached_with(0, 4096, |bytes| {
//!     bytes.iter().map(|&b| b as u64).sum::<u64>()
//! })?;
//! # let _ = checksum;
//! # Ok(())
//! # }
//! ```
//!
//! ## Builder
//!
//! ```rust,no_run
//! use bundle_rs::{BundleBuilder, Compressor, Result};
//!
//! # fn main() -> Result<()> {
//! let bundle = BundleBuilder::new()
//!     .path("/data/common.bundle")
//!     .chunk_size(64 * 1024)
//!     .compressor(Compressor::Lz4)
//!     .create()?;
//!
//! bundle.save(b"content", 0)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Header (60 bytes, little-endian)            │
//! │  - sizes (32-bit, mirrored as 64-bit)       │
//! │  - compressor id, chunk size, chunk count   │
//! ├─────────────────────────────────────────────┤
//! │ Chunk size table (4 bytes per chunk)        │
//! │  - compressed length of each chunk          │
//! ├─────────────────────────────────────────────┤
//! │ Compressed chunks, concatenated             │
//! └─────────────────────────────────────────────┘
//! ```

// Core implementation
pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use self::core::{
    bundle, cache, chunk_table, compression, config, error, header, io, record,
};

// Re-export core types that users need
pub use crate::core::{
    bundle::{Bundle, RangeBuf},
    cache::CacheStats,
    chunk_table::ChunkTable,
    compression::{
        ChunkCoder, Codec, CodecError, CodecMode, CodecParams, Compressor, StandardCodec,
        DEFAULT_COMPRESSION_LEVEL,
    },
    config::BundleConfig,
    error::{BundleError, Result},
    header::{Header, DEFAULT_CHUNK_SIZE, HEADER_SIZE},
    io::{BackingStream, Ownership, SharedStream, StreamRegistry},
    record::{BundleRecord, SizeRecord},
};

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Builder for file-backed bundles
///
/// Collects configuration, codec and an optional linked record, then either
/// creates a new bundle or opens an existing one.
///
/// # Examples
///
/// ```rust,no_run
/// use bundle_rs::BundleBuilder;
///
/// # fn main() -> bundle_rs::Result<()> {
/// let bundle = BundleBuilder::new()
///     .path("common.bundle")
///     .verify_on_open()
///     .open()?;
/// # Ok(())
/// # }
/// ```
pub struct BundleBuilder {
    path: Option<PathBuf>,
    config: BundleConfig,
    codec: Arc<dyn Codec>,
    record: Option<Arc<dyn SizeRecord>>,
}

impl BundleBuilder {
    /// Create a new BundleBuilder with default settings
    pub fn new() -> Self {
        BundleBuilder {
            path: None,
            config: BundleConfig::default(),
            codec: Arc::new(StandardCodec),
            record: None,
        }
    }

    /// Set the bundle file path
    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: BundleConfig) -> Self {
        self.config = config;
        self
    }

    /// Chunk size for new bundles
    pub fn chunk_size(mut self, chunk_size: u32) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// Compressor for new bundles
    pub fn compressor(mut self, compressor: Compressor) -> Self {
        self.config.compressor = compressor;
        self
    }

    /// Decode every chunk once when opening
    pub fn verify_on_open(mut self) -> Self {
        self.config.verify_on_open = true;
        self
    }

    /// Use a custom codec
    pub fn codec(mut self, codec: Arc<dyn Codec>) -> Self {
        self.codec = codec;
        self
    }

    /// Link an index record that mirrors the bundle size
    pub fn record(mut self, record: Arc<dyn SizeRecord>) -> Self {
        self.record = Some(record);
        self
    }

    /// Create (or truncate) the bundle file
    pub fn create(self) -> Result<Bundle<File>> {
        let path = self.require_path()?;
        info!("Creating bundle at {:?}", path);
        self.config.check()?;

        let file = io::create_file(&path)?;
        let bundle = Bundle::create(
            SharedStream::new(file),
            Ownership::Owned,
            self.codec,
            &self.config,
        )?;
        Self::link(bundle, self.record)
    }

    /// Open an existing bundle file
    pub fn open(self) -> Result<Bundle<File>> {
        let path = self.require_path()?;
        info!("Opening bundle at {:?}", path);

        let file = io::open_file(&path)?;
        let bundle = Bundle::open_with_config(
            SharedStream::new(file),
            Ownership::Owned,
            self.codec,
            &self.config,
        )?;
        Self::link(bundle, self.record)
    }

    fn require_path(&self) -> Result<PathBuf> {
        self.path
            .clone()
            .ok_or_else(|| BundleError::Config("path must be set".to_string()))
    }

    fn link(bundle: Bundle<File>, record: Option<Arc<dyn SizeRecord>>) -> Result<Bundle<File>> {
        if let Some(record) = record {
            bundle.attach_record(record)?;
            debug!("Linked index record");
        }
        Ok(bundle)
    }
}

impl Default for BundleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_requires_path() {
        assert!(matches!(
            BundleBuilder::new().create(),
            Err(BundleError::Config(_))
        ));
    }

    #[test]
    fn test_builder_create_and_open() -> Result<()> {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("builder.bundle");

        let bundle = BundleBuilder::new()
            .path(&path)
            .chunk_size(8)
            .compressor(Compressor::Lz4)
            .create()?;
        bundle.save(b"builder bundle content", 0)?;
        drop(bundle);

        let record = Arc::new(BundleRecord::new("builder"));
        let reopened = BundleBuilder::new()
            .path(&path)
            .verify_on_open()
            .record(record.clone())
            .open()?;

        assert_eq!(record.uncompressed_size(), 22);
        assert_eq!(reopened.header()?.chunk_size, 8);
        assert_eq!(reopened.read_all()?, b"builder bundle content");

        Ok(())
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let result = BundleBuilder::new()
            .path(temp_dir.path().join("bad.bundle"))
            .chunk_size(0)
            .create();
        assert!(matches!(result, Err(BundleError::Config(_))));
    }
}
