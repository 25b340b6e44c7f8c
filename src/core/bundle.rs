//! Bundle container
//!
//! Owns the header, chunk table and decoded cache of one bundle and the
//! handle to the stream it lives in. Every operation that touches the stream
//! holds the stream lock for its whole duration, then the bundle's own state
//! lock, always in that order.

use crate::cache::{CacheStats, ChunkCache};
use crate::chunk_table::{chunk_span, ChunkTable};
use crate::compression::{ChunkCoder, Codec, CodecParams, StandardCodec};
use crate::config::BundleConfig;
use crate::error::{BundleError, Result};
use crate::header::{
    ensure_little_endian, Header, DEFAULT_CHUNK_SIZE, HEADER_SIZE, MAX_BUNDLE_SIZE,
};
use crate::io::{self, BackingStream, Ownership, SharedStream, StreamGuard, StreamRegistry};
use crate::record::SizeRecord;
use parking_lot::Mutex;
use std::fs::File;
use std::ops::{Deref, Range};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Bytes returned by an uncached range read
///
/// Holds the decoded chunks covering the range and dereferences to exactly the
/// requested bytes.
#[derive(Debug, Clone, Default)]
pub struct RangeBuf {
    buf: Vec<u8>,
    start: usize,
    len: usize,
}

impl RangeBuf {
    fn new(buf: Vec<u8>, start: usize, len: usize) -> Self {
        RangeBuf { buf, start, len }
    }

    /// Requested bytes as an owned vector
    pub fn into_vec(mut self) -> Vec<u8> {
        self.buf.truncate(self.start + self.len);
        self.buf.drain(..self.start);
        self.buf
    }

    /// Bytes decoded to serve the request (whole chunks)
    pub fn decoded_len(&self) -> usize {
        self.buf.len()
    }
}

impl Deref for RangeBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[self.start..self.start + self.len]
    }
}

impl AsRef<[u8]> for RangeBuf {
    fn as_ref(&self) -> &[u8] {
        self
    }
}

struct BundleState {
    header: Header,
    chunks: ChunkTable,
    cache: ChunkCache,
    record: Option<Arc<dyn SizeRecord>>,
    disposed: bool,
}

impl BundleState {
    fn new(header: Header, chunks: ChunkTable) -> Self {
        BundleState {
            header,
            chunks,
            cache: ChunkCache::new(),
            record: None,
            disposed: false,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.disposed {
            return Err(BundleError::Disposed);
        }
        Ok(())
    }

    fn size(&self) -> u64 {
        self.header.uncompressed_size as u64
    }

    fn check_range(&self, offset: u64, length: usize) -> Result<()> {
        let size = self.size();
        match offset.checked_add(length as u64) {
            Some(end) if end <= size => Ok(()),
            _ => Err(BundleError::OutOfRange {
                offset,
                length: length as u64,
                size,
            }),
        }
    }

    fn mirror_size(&self) {
        if let Some(record) = &self.record {
            record.set_uncompressed_size(self.size());
        }
    }
}

#[derive(Debug, Default)]
struct DecodeTally {
    decoded: u64,
    skipped: u64,
}

/// Decodes chunks from the stream for one operation
struct ChunkReader<'a> {
    header: &'a Header,
    chunks: &'a ChunkTable,
    coder: Box<dyn ChunkCoder>,
    scratch: Vec<u8>,
}

impl<'a> ChunkReader<'a> {
    fn new(codec: &dyn Codec, header: &'a Header, chunks: &'a ChunkTable) -> Result<Self> {
        let params = CodecParams::decode(header.chunk_size as usize, header.compressor()?);
        let coder = codec.configure(&params)?;
        // Sized from the table, never from the header's chunk size alone
        let scratch_len = (chunks.max_len() as usize).min(coder.max_compressed_buffer_size());
        let scratch = Vec::with_capacity(scratch_len);

        Ok(ChunkReader {
            header,
            chunks,
            coder,
            scratch,
        })
    }

    /// Seek to the first compressed byte of chunk `index`
    fn seek_chunk<S: BackingStream>(
        &self,
        guard: &mut StreamGuard<'_, S>,
        index: usize,
    ) -> Result<()> {
        guard.seek_to(self.header.header_region_len() + self.chunks.offset_of(index))
    }

    /// Compressed length of chunk `index`
    fn compressed_len(&self, index: usize) -> Result<usize> {
        self.chunks.get(index).map(|len| len as usize).ok_or_else(|| {
            BundleError::InvalidHeader(format!(
                "chunk {} is past the {}-entry size table",
                index,
                self.chunks.len()
            ))
        })
    }

    /// Decode the chunk at the current stream position into `out`
    fn decode_chunk<S: BackingStream>(
        &mut self,
        guard: &mut StreamGuard<'_, S>,
        index: usize,
        out: &mut [u8],
    ) -> Result<()> {
        let compressed_len = self.compressed_len(index)?;
        let expected = self.header.chunk_len(index);
        if out.len() < expected {
            return Err(BundleError::BufferTooSmall {
                required: expected,
                actual: out.len(),
            });
        }

        self.scratch.resize(compressed_len, 0);
        guard.read_exact(&mut self.scratch)?;

        let actual = self
            .coder
            .decode(&self.scratch, &mut out[..expected])
            .map_err(|source| BundleError::Decode {
                chunk: index,
                source,
            })?;

        if actual != expected {
            return Err(BundleError::CorruptChunk {
                chunk: index,
                expected,
                actual,
            });
        }

        trace!(chunk = index, compressed_len, expected, "Decoded chunk");
        Ok(())
    }

    /// Decode `span` into `dst`, where `dst[0]` is the first byte of chunk `base`
    ///
    /// With a validity table, chunks already marked valid are skipped by
    /// seeking past their compressed bytes, and freshly decoded chunks are
    /// marked valid.
    fn decode_span<S: BackingStream>(
        &mut self,
        guard: &mut StreamGuard<'_, S>,
        span: Range<usize>,
        dst: &mut [u8],
        base: usize,
        mut valid: Option<&mut [bool]>,
        tally: &mut DecodeTally,
    ) -> Result<()> {
        if span.is_empty() {
            return Ok(());
        }

        let chunk_size = self.header.chunk_size as usize;
        self.seek_chunk(guard, span.start)?;

        for index in span {
            if valid.as_deref().is_some_and(|valid| valid[index]) {
                guard.skip(self.compressed_len(index)? as u64)?;
                tally.skipped += 1;
                continue;
            }

            let start = (index - base) * chunk_size;
            self.decode_chunk(guard, index, &mut dst[start..])?;
            tally.decoded += 1;

            if let Some(valid) = valid.as_deref_mut() {
                valid[index] = true;
            }
        }

        Ok(())
    }

    /// Decode every chunk once, discarding the output
    fn verify_all<S: BackingStream>(&mut self, guard: &mut StreamGuard<'_, S>) -> Result<()> {
        if self.chunks.is_empty() {
            return Ok(());
        }

        // Chunk 0 is the largest: a full chunk, or the only one
        let mut out = vec![0u8; self.header.chunk_len(0)];
        self.seek_chunk(guard, 0)?;
        for index in 0..self.chunks.len() {
            self.decode_chunk(guard, index, &mut out)?;
        }
        Ok(())
    }
}

/// Chunked, compressed, random-access bundle
///
/// Safe to share across threads; all access to the backing stream is
/// serialized through its [`SharedStream`] lock.
///
/// # Examples
///
/// ```rust,no_run
/// use bundle_rs::{Bundle, BundleConfig};
///
/// # fn main() -> bundle_rs::Result<()> {
/// let bundle = Bundle::create_path("common.bundle", &BundleConfig::default())?;
/// bundle.save(b"Hello, World!", 3)?;
///
/// let hello = bundle.read_range(0, 5)?;
/// assert_eq!(&*hello, b"Hello");
///
/// bundle.dispose()?;
/// # Ok(())
/// # }
/// ```
pub struct Bundle<S: BackingStream = File> {
    stream: SharedStream<S>,
    ownership: Ownership,
    codec: Arc<dyn Codec>,
    state: Mutex<BundleState>,
}

impl<S: BackingStream> Bundle<S> {
    /// Open an existing bundle stored at the start of `stream`
    pub fn open(
        stream: SharedStream<S>,
        ownership: Ownership,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        Self::open_with_config(stream, ownership, codec, &BundleConfig::default())
    }

    /// Open an existing bundle, applying `config.verify_on_open`
    pub fn open_with_config(
        stream: SharedStream<S>,
        ownership: Ownership,
        codec: Arc<dyn Codec>,
        config: &BundleConfig,
    ) -> Result<Self> {
        ensure_little_endian()?;

        let (header, chunks) = {
            let mut guard = stream.lock();
            let stream_len = guard.stream_len()?;
            if stream_len < HEADER_SIZE as u64 {
                return Err(BundleError::Truncated {
                    expected: HEADER_SIZE as u64,
                    actual: stream_len,
                });
            }

            let mut raw = [0u8; HEADER_SIZE];
            guard.seek_to(0)?;
            guard.read_exact(&mut raw)?;

            let header = Header::from_bytes(&raw)?;
            header.validate()?;

            if stream_len < header.header_region_len() {
                return Err(BundleError::Truncated {
                    expected: header.header_region_len(),
                    actual: stream_len,
                });
            }

            let chunks = ChunkTable::read_from(guard.stream()?, header.chunk_count as usize)?;
            if chunks.total() != header.compressed_size as u64 {
                return Err(BundleError::InvalidHeader(format!(
                    "chunk table sums to {} bytes, header says {}",
                    chunks.total(),
                    header.compressed_size
                )));
            }

            if stream_len < header.total_len() {
                return Err(BundleError::Truncated {
                    expected: header.total_len(),
                    actual: stream_len,
                });
            }
            if stream_len > header.total_len() {
                warn!(
                    stream_len,
                    expected = header.total_len(),
                    "Bundle stream has trailing bytes"
                );
            }

            if config.verify_on_open {
                ChunkReader::new(codec.as_ref(), &header, &chunks)?.verify_all(&mut guard)?;
            }

            (header, chunks)
        };

        info!(
            uncompressed_size = header.uncompressed_size,
            compressed_size = header.compressed_size,
            chunk_count = header.chunk_count,
            chunk_size = header.chunk_size,
            "Opened bundle"
        );

        Ok(Bundle {
            stream,
            ownership,
            codec,
            state: Mutex::new(BundleState::new(header, chunks)),
        })
    }

    /// Write an empty bundle over `stream`
    pub fn create(
        stream: SharedStream<S>,
        ownership: Ownership,
        codec: Arc<dyn Codec>,
        config: &BundleConfig,
    ) -> Result<Self> {
        ensure_little_endian()?;
        config.check()?;

        let header = Header::empty(config.chunk_size, config.compressor);
        {
            let mut guard = stream.lock();
            guard.seek_to(0)?;
            guard.write_all(&header.to_bytes())?;
            guard.set_len(HEADER_SIZE as u64)?;
            guard.flush()?;
        }

        info!(
            chunk_size = config.chunk_size,
            compressor = config.compressor.name(),
            "Created empty bundle"
        );

        Ok(Bundle {
            stream,
            ownership,
            codec,
            state: Mutex::new(BundleState::new(header, ChunkTable::new())),
        })
    }

    /// Read the whole content without touching the cache
    pub fn read_all(&self) -> Result<Vec<u8>> {
        let mut guard = self.stream.lock();
        let state = self.state.lock();
        state.ensure_open()?;

        let mut out = vec![0u8; state.size() as usize];
        self.decode_uncached(&mut guard, &state, 0..state.header.chunk_count as usize, &mut out)?;
        Ok(out)
    }

    /// Read the whole content into `dst`, returning the number of bytes written
    pub fn read_all_into(&self, dst: &mut [u8]) -> Result<usize> {
        let mut guard = self.stream.lock();
        let state = self.state.lock();
        state.ensure_open()?;

        let size = state.size() as usize;
        if dst.len() < size {
            return Err(BundleError::BufferTooSmall {
                required: size,
                actual: dst.len(),
            });
        }

        self.decode_uncached(
            &mut guard,
            &state,
            0..state.header.chunk_count as usize,
            &mut dst[..size],
        )?;
        Ok(size)
    }

    /// Read `length` bytes at `offset`, decoding only the chunks they touch
    pub fn read_range(&self, offset: u64, length: usize) -> Result<RangeBuf> {
        let mut guard = self.stream.lock();
        let state = self.state.lock();
        state.ensure_open()?;
        state.check_range(offset, length)?;

        if length == 0 {
            return Ok(RangeBuf::default());
        }

        let chunk_size = state.header.chunk_size as u64;
        let span = chunk_span(offset, length as u64, state.header.chunk_size);
        let first_byte = span.start as u64 * chunk_size;
        let last_byte = (span.end as u64 * chunk_size).min(state.size());

        let mut buf = vec![0u8; (last_byte - first_byte) as usize];
        self.decode_uncached(&mut guard, &state, span, &mut buf)?;

        Ok(RangeBuf::new(buf, (offset - first_byte) as usize, length))
    }

    /// Run `f` over the whole content, decoding through the cache
    pub fn read_all_cached_with<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T,
    {
        self.cached_view(None, f)
    }

    /// Run `f` over `length` bytes at `offset`, decoding through the cache
    ///
    /// Each chunk is decoded at most once until the cache is invalidated or
    /// the bundle is saved. The slice passed to `f` borrows the cache and is
    /// only valid for the call.
    pub fn read_range_cached_with<F, T>(&self, offset: u64, length: usize, f: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T,
    {
        self.cached_view(Some((offset, length)), f)
    }

    /// Whole content through the cache, copied out
    pub fn read_all_cached(&self) -> Result<Vec<u8>> {
        self.read_all_cached_with(|bytes| bytes.to_vec())
    }

    /// Range through the cache, copied out
    pub fn read_range_cached(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        self.read_range_cached_with(offset, length, |bytes| bytes.to_vec())
    }

    /// Replace the whole content, recompressing every chunk at `level`
    ///
    /// Not atomic: a failure part-way leaves the stream inconsistent with its
    /// header. In-memory state only changes once the save has completed.
    pub fn save(&self, content: &[u8], level: i32) -> Result<()> {
        let mut guard = self.stream.lock();
        let mut state = self.state.lock();
        state.ensure_open()?;

        if content.len() as u64 > MAX_BUNDLE_SIZE {
            return Err(BundleError::TooLarge(content.len() as u64));
        }

        state.cache.invalidate();

        let mut header = state.header;
        if header.chunk_size == 0 {
            header.chunk_size = DEFAULT_CHUNK_SIZE;
        }
        header.resize(content.len() as u32);

        let chunk_size = header.chunk_size as usize;
        let chunk_count = header.chunk_count as usize;
        let params = CodecParams::encode(chunk_size, header.compressor()?, level);
        let mut coder = self.codec.configure(&params)?;

        let mut chunks = ChunkTable::with_capacity(chunk_count);
        let mut compressed_size: u64 = 0;

        guard.seek_to(header.header_region_len())?;
        for (index, chunk) in content.chunks(chunk_size).enumerate() {
            let encoded = if index + 1 < chunk_count {
                coder.encode(chunk)
            } else {
                coder.encode_exact(chunk, header.last_chunk_size())
            }
            .map_err(|source| BundleError::Encode {
                chunk: index,
                source,
            })?;

            compressed_size += encoded.len() as u64;
            if compressed_size > MAX_BUNDLE_SIZE {
                return Err(BundleError::TooLarge(compressed_size));
            }

            chunks.push(encoded.len() as u32);
            guard.write_all(&encoded)?;
        }

        header.set_compressed_size(compressed_size as u32);

        guard.seek_to(0)?;
        guard.write_all(&header.to_bytes())?;
        chunks.write_to(guard.stream()?)?;
        guard.set_len(header.total_len())?;
        guard.flush()?;

        state.header = header;
        state.chunks = chunks;
        state.mirror_size();

        info!(
            uncompressed_size = header.uncompressed_size,
            compressed_size = header.compressed_size,
            chunk_count = header.chunk_count,
            level,
            "Saved bundle"
        );
        Ok(())
    }

    /// Decode every chunk once without touching the cache
    pub fn verify(&self) -> Result<()> {
        let mut guard = self.stream.lock();
        let state = self.state.lock();
        state.ensure_open()?;

        ChunkReader::new(self.codec.as_ref(), &state.header, &state.chunks)?.verify_all(&mut guard)
    }

    /// Drop the decoded cache
    pub fn invalidate_cache(&self) -> Result<()> {
        let _guard = self.stream.lock();
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.cache.invalidate();
        Ok(())
    }

    /// Release the cache and close the stream if owned
    ///
    /// Safe to call more than once; every other operation fails with
    /// `Disposed` afterwards.
    pub fn dispose(&self) -> Result<()> {
        let mut guard = self.stream.lock();
        let mut state = self.state.lock();
        if state.disposed {
            return Ok(());
        }

        state.disposed = true;
        state.cache.invalidate();
        state.record = None;

        let mut flushed = Ok(());
        if self.ownership == Ownership::Owned {
            // The stream is closed even when the final flush fails
            if let Ok(stream) = guard.stream() {
                flushed = stream.flush();
            }
            guard.close();
        }

        debug!(ownership = ?self.ownership, "Disposed bundle");
        flushed.map_err(BundleError::from)
    }

    /// Link an index record; its mirrored size is updated now and after every save
    pub fn attach_record(&self, record: Arc<dyn SizeRecord>) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        record.set_uncompressed_size(state.size());
        state.record = Some(record);
        Ok(())
    }

    pub fn detach_record(&self) -> Option<Arc<dyn SizeRecord>> {
        self.state.lock().record.take()
    }

    pub fn header(&self) -> Result<Header> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.header)
    }

    pub fn uncompressed_size(&self) -> Result<u64> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.size())
    }

    pub fn chunk_count(&self) -> Result<usize> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.header.chunk_count as usize)
    }

    /// Compressed length of every chunk
    pub fn chunk_sizes(&self) -> Result<Vec<u32>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.chunks.as_slice().to_vec())
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.lock().cache.stats()
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Handle to the backing stream, for sharing its lock with other consumers
    pub fn stream(&self) -> &SharedStream<S> {
        &self.stream
    }

    fn decode_uncached(
        &self,
        guard: &mut StreamGuard<'_, S>,
        state: &BundleState,
        span: Range<usize>,
        dst: &mut [u8],
    ) -> Result<()> {
        if span.is_empty() {
            return Ok(());
        }

        let base = span.start;
        let mut tally = DecodeTally::default();
        ChunkReader::new(self.codec.as_ref(), &state.header, &state.chunks)?
            .decode_span(guard, span, dst, base, None, &mut tally)?;

        debug!(decoded = tally.decoded, "Uncached read");
        Ok(())
    }

    fn cached_view<F, T>(&self, range: Option<(u64, usize)>, f: F) -> Result<T>
    where
        F: FnOnce(&[u8]) -> T,
    {
        let mut guard = self.stream.lock();
        let mut state = self.state.lock();
        state.ensure_open()?;

        let (offset, length) = range.unwrap_or((0, state.size() as usize));
        state.check_range(offset, length)?;
        if length == 0 {
            return Ok(f(&[]));
        }

        let span = chunk_span(offset, length as u64, state.header.chunk_size);
        let BundleState {
            header,
            chunks,
            cache,
            ..
        } = &mut *state;
        let header: &Header = header;
        let chunks: &ChunkTable = chunks;

        let mut tally = DecodeTally::default();
        let result = match ChunkReader::new(self.codec.as_ref(), header, chunks) {
            Ok(mut reader) => {
                let slots =
                    cache.slots(header.uncompressed_size as usize, header.chunk_count as usize);
                reader.decode_span(&mut guard, span, slots.buffer, 0, Some(slots.valid), &mut tally)
            }
            Err(e) => Err(e),
        };

        for _ in 0..tally.decoded {
            cache.record_decode();
        }
        for _ in 0..tally.skipped {
            cache.record_hit();
        }
        result?;

        debug!(
            decoded = tally.decoded,
            skipped = tally.skipped,
            "Cached read"
        );

        let buffer = cache.buffer().unwrap_or_default();
        let start = offset as usize;
        Ok(f(&buffer[start..start + length]))
    }
}

impl Bundle<File> {
    /// Open a bundle file, owning its handle
    pub fn open_path<P: AsRef<Path>>(path: P, config: &BundleConfig) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "Opening bundle file");
        let file = io::open_file(path)?;
        Self::open_with_config(
            SharedStream::new(file),
            Ownership::Owned,
            Arc::new(StandardCodec),
            config,
        )
    }

    /// Create (or truncate) a bundle file, owning its handle
    pub fn create_path<P: AsRef<Path>>(path: P, config: &BundleConfig) -> Result<Self> {
        let path = path.as_ref();
        debug!(?path, "Creating bundle file");
        let file = io::create_file(path)?;
        Self::create(
            SharedStream::new(file),
            Ownership::Owned,
            Arc::new(StandardCodec),
            config,
        )
    }

    /// Open a bundle file through a registry so it shares one lock per path
    pub fn open_shared<P: AsRef<Path>>(
        registry: &StreamRegistry,
        path: P,
        config: &BundleConfig,
    ) -> Result<Self> {
        let stream = registry.open(path)?;
        Self::open_with_config(stream, Ownership::Borrowed, Arc::new(StandardCodec), config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::Compressor;
    use std::io::Cursor;
    use std::sync::atomic::AtomicU64;

    fn memory_bundle(config: &BundleConfig) -> Bundle<Cursor<Vec<u8>>> {
        Bundle::create(
            SharedStream::new(Cursor::new(Vec::new())),
            Ownership::Owned,
            Arc::new(StandardCodec),
            config,
        )
        .unwrap()
    }

    fn small_config() -> BundleConfig {
        BundleConfig::default().with_chunk_size(4)
    }

    #[test]
    fn test_create_empty() {
        let bundle = memory_bundle(&BundleConfig::default());
        assert_eq!(bundle.uncompressed_size().unwrap(), 0);
        assert_eq!(bundle.chunk_count().unwrap(), 0);
        assert!(bundle.read_all().unwrap().is_empty());
        assert!(bundle.read_all_cached().unwrap().is_empty());
        assert_eq!(bundle.stream().lock().stream_len().unwrap(), 60);
    }

    #[test]
    fn test_save_and_read_back() {
        let bundle = memory_bundle(&small_config());
        let content = b"0123456789".to_vec();
        bundle.save(&content, 3).unwrap();

        assert_eq!(bundle.chunk_count().unwrap(), 3);
        assert_eq!(bundle.read_all().unwrap(), content);
        assert_eq!(bundle.read_all_cached().unwrap(), content);
        assert_eq!(&*bundle.read_range(5, 3).unwrap(), b"567");
        assert_eq!(bundle.read_range_cached(5, 3).unwrap(), b"567");
    }

    #[test]
    fn test_range_buf_views() {
        let bundle = memory_bundle(&small_config());
        bundle.save(b"0123456789", 3).unwrap();

        let view = bundle.read_range(5, 4).unwrap();
        assert_eq!(view.decoded_len(), 6);
        assert_eq!(view.as_ref(), b"5678");
        assert_eq!(view.into_vec(), b"5678".to_vec());

        let empty = bundle.read_range(10, 0).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_out_of_range() {
        let bundle = memory_bundle(&small_config());
        bundle.save(b"0123456789", 3).unwrap();

        assert!(matches!(
            bundle.read_range(8, 3),
            Err(BundleError::OutOfRange {
                offset: 8,
                length: 3,
                size: 10
            })
        ));
        assert!(bundle.read_range(u64::MAX, 2).is_err());
        assert!(bundle.read_range_cached(11, 0).is_err());
    }

    #[test]
    fn test_read_all_into() {
        let bundle = memory_bundle(&small_config());
        bundle.save(b"0123456789", 3).unwrap();

        let mut small = [0u8; 9];
        assert!(matches!(
            bundle.read_all_into(&mut small),
            Err(BundleError::BufferTooSmall {
                required: 10,
                actual: 9
            })
        ));

        let mut big = [0xEEu8; 12];
        assert_eq!(bundle.read_all_into(&mut big).unwrap(), 10);
        assert_eq!(&big[..10], b"0123456789");
        assert_eq!(&big[10..], &[0xEE, 0xEE]);
    }

    #[test]
    fn test_cache_decodes_once() {
        let bundle = memory_bundle(&small_config());
        bundle.save(b"0123456789", 3).unwrap();

        bundle.read_range_cached(0, 6).unwrap();
        bundle.read_range_cached(2, 8).unwrap();
        bundle.read_all_cached().unwrap();

        let stats = bundle.cache_stats();
        assert_eq!(stats.decodes, 3);
        assert_eq!(stats.resident_chunks, 3);
        assert_eq!(stats.allocated_bytes, 10);

        bundle.invalidate_cache().unwrap();
        assert_eq!(bundle.cache_stats().allocated_bytes, 0);
        bundle.read_range_cached(9, 1).unwrap();
        assert_eq!(bundle.cache_stats().decodes, 4);
    }

    #[test]
    fn test_save_invalidates_cache() {
        let bundle = memory_bundle(&small_config());
        bundle.save(b"aaaabbbb", 3).unwrap();
        assert_eq!(bundle.read_all_cached().unwrap(), b"aaaabbbb");

        bundle.save(b"ccccdd", 3).unwrap();
        assert_eq!(bundle.cache_stats().allocated_bytes, 0);
        assert_eq!(bundle.read_all_cached().unwrap(), b"ccccdd");
    }

    #[test]
    fn test_reopen_from_stream() {
        let config = BundleConfig::default()
            .with_chunk_size(1024)
            .with_compressor(Compressor::Lz4);
        let bundle = memory_bundle(&config);
        let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        bundle.save(&content, 0).unwrap();

        let stream = bundle.stream().clone();
        let reopened = Bundle::open(stream, Ownership::Borrowed, Arc::new(StandardCodec)).unwrap();
        let header = reopened.header().unwrap();
        assert_eq!(header.chunk_size, 1024);
        assert_eq!(header.compressor().unwrap(), Compressor::Lz4);
        assert_eq!(reopened.read_all().unwrap(), content);
    }

    #[test]
    fn test_dispose() {
        let bundle = memory_bundle(&small_config());
        bundle.save(b"data", 3).unwrap();

        bundle.dispose().unwrap();
        bundle.dispose().unwrap();
        assert!(bundle.is_disposed());
        assert!(bundle.stream().is_closed());
        assert!(matches!(bundle.read_all(), Err(BundleError::Disposed)));
        assert!(matches!(bundle.save(b"x", 3), Err(BundleError::Disposed)));
        assert!(matches!(bundle.header(), Err(BundleError::Disposed)));
    }

    #[test]
    fn test_borrowed_stream_stays_open() {
        let stream = SharedStream::new(Cursor::new(Vec::new()));
        let bundle = Bundle::create(
            stream.clone(),
            Ownership::Borrowed,
            Arc::new(StandardCodec),
            &small_config(),
        )
        .unwrap();
        bundle.save(b"borrowed", 3).unwrap();
        bundle.dispose().unwrap();

        assert!(!stream.is_closed());
        let reopened = Bundle::open(stream, Ownership::Owned, Arc::new(StandardCodec)).unwrap();
        assert_eq!(reopened.read_all().unwrap(), b"borrowed");
    }

    #[test]
    fn test_record_mirrors_size() {
        let bundle = memory_bundle(&small_config());
        bundle.save(b"12345", 3).unwrap();

        let record = Arc::new(AtomicU64::new(0));
        bundle.attach_record(record.clone()).unwrap();
        assert_eq!(record.load(std::sync::atomic::Ordering::Acquire), 5);

        bundle.save(b"123456789", 3).unwrap();
        assert_eq!(record.load(std::sync::atomic::Ordering::Acquire), 9);

        assert!(bundle.detach_record().is_some());
        bundle.save(b"1", 3).unwrap();
        assert_eq!(record.load(std::sync::atomic::Ordering::Acquire), 9);
    }

    #[test]
    fn test_verify() {
        let bundle = memory_bundle(&small_config());
        bundle.save(b"verify me please", 3).unwrap();
        bundle.verify().unwrap();
        assert_eq!(bundle.cache_stats().decodes, 0);
    }
}
