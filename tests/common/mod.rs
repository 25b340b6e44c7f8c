//! Instrumented codec and stream shared by the integration tests

#![allow(dead_code)]

use bundle_rs::{
    BackingStream, Bundle, BundleConfig, ChunkCoder, Codec, CodecError, CodecParams, Ownership,
    SharedStream, StandardCodec,
};
use parking_lot::Mutex;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Content whose chunk `i` is filled with byte `i`, so a decoded chunk names itself
pub fn tagged_content(chunk_size: usize, len: usize) -> Vec<u8> {
    (0..len).map(|i| (i / chunk_size) as u8).collect()
}

/// Pseudo-random but compressible content
pub fn sample_content(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 131) ^ (i >> 5)) as u8).collect()
}

/// Wraps [`StandardCodec`] and records every decode
///
/// With [`tagged_content`], the first byte of each decoded chunk is its index.
#[derive(Default)]
pub struct CountingCodec {
    pub decodes: Arc<AtomicUsize>,
    pub encodes: Arc<AtomicUsize>,
    pub decoded_tags: Arc<Mutex<Vec<u8>>>,
}

impl CountingCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::SeqCst)
    }

    /// Drain the tags recorded so far
    pub fn take_tags(&self) -> Vec<u8> {
        std::mem::take(&mut *self.decoded_tags.lock())
    }
}

impl Codec for CountingCodec {
    fn configure(&self, params: &CodecParams) -> Result<Box<dyn ChunkCoder>, CodecError> {
        Ok(Box::new(CountingCoder {
            inner: StandardCodec.configure(params)?,
            decodes: self.decodes.clone(),
            encodes: self.encodes.clone(),
            decoded_tags: self.decoded_tags.clone(),
        }))
    }
}

struct CountingCoder {
    inner: Box<dyn ChunkCoder>,
    decodes: Arc<AtomicUsize>,
    encodes: Arc<AtomicUsize>,
    decoded_tags: Arc<Mutex<Vec<u8>>>,
}

impl ChunkCoder for CountingCoder {
    fn encode(&mut self, src: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.encodes.fetch_add(1, Ordering::SeqCst);
        self.inner.encode(src)
    }

    fn decode(&mut self, compressed: &[u8], dst: &mut [u8]) -> Result<usize, CodecError> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        let n = self.inner.decode(compressed, dst)?;
        if let Some(&tag) = dst.first() {
            self.decoded_tags.lock().push(tag);
        }
        Ok(n)
    }

    fn max_compressed_buffer_size(&self) -> usize {
        self.inner.max_compressed_buffer_size()
    }
}

/// In-memory stream that counts every I/O call made on it
#[derive(Clone, Default)]
pub struct IoCounters {
    pub reads: Arc<AtomicUsize>,
    pub writes: Arc<AtomicUsize>,
    pub seeks: Arc<AtomicUsize>,
}

impl IoCounters {
    pub fn total(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
            + self.writes.load(Ordering::SeqCst)
            + self.seeks.load(Ordering::SeqCst)
    }
}

pub struct CountingStream {
    inner: Cursor<Vec<u8>>,
    pub counters: IoCounters,
}

impl CountingStream {
    pub fn new() -> Self {
        CountingStream {
            inner: Cursor::new(Vec::new()),
            counters: IoCounters::default(),
        }
    }

    pub fn with_bytes(bytes: Vec<u8>) -> Self {
        CountingStream {
            inner: Cursor::new(bytes),
            counters: IoCounters::default(),
        }
    }
}

impl Read for CountingStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(buf)
    }
}

impl Write for CountingStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl Seek for CountingStream {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.counters.seeks.fetch_add(1, Ordering::SeqCst);
        self.inner.seek(pos)
    }
}

impl BackingStream for CountingStream {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.get_mut().resize(len as usize, 0);
        Ok(())
    }

    fn stream_len(&mut self) -> std::io::Result<u64> {
        Ok(self.inner.get_ref().len() as u64)
    }
}

/// Bundle over an in-memory stream with a counting codec
pub fn memory_bundle(
    config: &BundleConfig,
) -> (Bundle<Cursor<Vec<u8>>>, Arc<CountingCodec>) {
    let codec = Arc::new(CountingCodec::new());
    let bundle = Bundle::create(
        SharedStream::new(Cursor::new(Vec::new())),
        Ownership::Owned,
        codec.clone(),
        config,
    )
    .unwrap();
    (bundle, codec)
}

/// Raw bytes of a saved in-memory bundle
pub fn bundle_bytes(content: &[u8], config: &BundleConfig) -> Vec<u8> {
    let stream = SharedStream::new(Cursor::new(Vec::new()));
    let bundle = Bundle::create(
        stream.clone(),
        Ownership::Borrowed,
        Arc::new(StandardCodec),
        config,
    )
    .unwrap();
    bundle.save(content, config.compression_level).unwrap();
    drop(bundle);
    stream.into_inner().unwrap().into_inner()
}

/// Open raw bundle bytes with the standard codec
pub fn open_bytes(bytes: Vec<u8>) -> bundle_rs::Result<Bundle<Cursor<Vec<u8>>>> {
    Bundle::open(
        SharedStream::new(Cursor::new(bytes)),
        Ownership::Owned,
        Arc::new(StandardCodec),
    )
}
