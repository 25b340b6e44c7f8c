//! Backing stream access for bundles
//!
//! A bundle's seek position is shared state: "seek then read N bytes" must not
//! interleave with another operation on the same stream. Streams are therefore
//! wrapped in a [`SharedStream`], whose mutex is held for a whole bundle
//! operation. Every bundle (or other consumer) holding a clone of the same
//! `SharedStream` serializes on the same lock.

use crate::error::{BundleError, Result};
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// Seekable byte store a bundle lives in
pub trait BackingStream: Read + Write + Seek + Send {
    /// Truncate or extend the store to exactly `len` bytes
    fn set_len(&mut self, len: u64) -> std::io::Result<()>;

    /// Current length of the store
    fn stream_len(&mut self) -> std::io::Result<u64> {
        self.seek(SeekFrom::End(0))
    }
}

impl BackingStream for File {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        File::set_len(self, len)
    }

    fn stream_len(&mut self) -> std::io::Result<u64> {
        Ok(self.metadata()?.len())
    }
}

impl BackingStream for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> std::io::Result<()> {
        self.get_mut().resize(len as usize, 0);
        Ok(())
    }

    fn stream_len(&mut self) -> std::io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }
}

/// Whether a bundle closes its stream on dispose
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// Closed when the bundle is disposed
    Owned,
    /// Left open for other holders
    Borrowed,
}

/// Lock-protected stream handle shared between bundles
///
/// The `Arc` identity is the lock key: clones lock the same mutex.
pub struct SharedStream<S> {
    inner: Arc<Mutex<Option<S>>>,
}

impl<S> Clone for SharedStream<S> {
    fn clone(&self) -> Self {
        SharedStream {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: BackingStream> SharedStream<S> {
    pub fn new(stream: S) -> Self {
        SharedStream {
            inner: Arc::new(Mutex::new(Some(stream))),
        }
    }

    /// Acquire the stream for one operation
    pub fn lock(&self) -> StreamGuard<'_, S> {
        StreamGuard {
            guard: self.inner.lock(),
        }
    }

    /// True if both handles share one lock
    pub fn same_stream(&self, other: &SharedStream<S>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Drop the stream; later operations through any clone fail with `Disposed`
    pub fn close(&self) {
        self.inner.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().is_none()
    }

    /// Take the stream out if it is still open
    pub fn into_inner(self) -> Option<S> {
        self.inner.lock().take()
    }
}

/// Exclusive access to a shared stream for the guard's lifetime
pub struct StreamGuard<'a, S> {
    guard: MutexGuard<'a, Option<S>>,
}

impl<S: BackingStream> StreamGuard<'_, S> {
    pub fn stream(&mut self) -> Result<&mut S> {
        self.guard.as_mut().ok_or(BundleError::Disposed)
    }

    pub fn seek_to(&mut self, offset: u64) -> Result<()> {
        self.stream()?.seek(SeekFrom::Start(offset))?;
        Ok(())
    }

    pub fn skip(&mut self, len: u64) -> Result<()> {
        self.stream()?.seek(SeekFrom::Current(len as i64))?;
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.stream()?.read_exact(buf)?;
        Ok(())
    }

    pub fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.stream()?.write_all(buf)?;
        Ok(())
    }

    pub fn set_len(&mut self, len: u64) -> Result<()> {
        self.stream()?.set_len(len)?;
        Ok(())
    }

    pub fn stream_len(&mut self) -> Result<u64> {
        Ok(self.stream()?.stream_len()?)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.stream()?.flush()?;
        Ok(())
    }

    /// Close the stream while holding the lock
    pub fn close(&mut self) {
        self.guard.take();
    }
}

/// Open a bundle file for read/write, mapping a missing path to `NotFound`
pub fn open_file<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BundleError::NotFound(path.to_path_buf()),
            _ => BundleError::Io(e),
        })
}

/// Create (or truncate) a bundle file for read/write
pub fn create_file<P: AsRef<Path>>(path: P) -> Result<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    Ok(file)
}

/// One shared stream per file path
///
/// Bundles opened through the same registry on the same path share a single
/// lock, so their seek/read and seek/write sequences never interleave.
#[derive(Default)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<PathBuf, Weak<Mutex<Option<File>>>>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        StreamRegistry::default()
    }

    /// Shared stream for an existing file
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<SharedStream<File>> {
        let path = path.as_ref();
        let key = std::fs::canonicalize(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => BundleError::NotFound(path.to_path_buf()),
            _ => BundleError::Io(e),
        })?;

        let mut streams = self.streams.lock();
        if let Some(inner) = streams.get(&key).and_then(Weak::upgrade) {
            if inner.lock().is_some() {
                return Ok(SharedStream { inner });
            }
        }

        let shared = SharedStream::new(open_file(&key)?);
        streams.insert(key, Arc::downgrade(&shared.inner));
        streams.retain(|_, weak| weak.strong_count() > 0);
        Ok(shared)
    }

    /// Number of paths with a live stream
    pub fn live_streams(&self) -> usize {
        self.streams
            .lock()
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cursor_set_len() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3, 4, 5]);
        BackingStream::set_len(&mut cursor, 2).unwrap();
        assert_eq!(cursor.stream_len().unwrap(), 2);
        BackingStream::set_len(&mut cursor, 4).unwrap();
        assert_eq!(cursor.get_ref(), &vec![1, 2, 0, 0]);
    }

    #[test]
    fn test_guard_read_write() {
        let shared = SharedStream::new(Cursor::new(Vec::new()));
        {
            let mut guard = shared.lock();
            guard.write_all(b"hello world").unwrap();
            guard.seek_to(6).unwrap();
            let mut buf = [0u8; 5];
            guard.read_exact(&mut buf).unwrap();
            assert_eq!(&buf, b"world");
        }

        let clone = shared.clone();
        assert!(clone.same_stream(&shared));
        assert!(!SharedStream::new(Cursor::new(Vec::new())).same_stream(&shared));
    }

    #[test]
    fn test_closed_stream_reports_disposed() {
        let shared = SharedStream::new(Cursor::new(vec![0u8; 4]));
        let other = shared.clone();
        shared.close();

        assert!(other.is_closed());
        let mut guard = other.lock();
        assert!(matches!(guard.seek_to(0), Err(BundleError::Disposed)));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("missing.bundle");
        assert!(matches!(open_file(&missing), Err(BundleError::NotFound(_))));

        let registry = StreamRegistry::new();
        assert!(matches!(
            registry.open(&missing),
            Err(BundleError::NotFound(_))
        ));
    }

    #[test]
    fn test_registry_shares_lock_per_path() {
        let temp = NamedTempFile::new().unwrap();
        let registry = StreamRegistry::new();

        let a = registry.open(temp.path()).unwrap();
        let b = registry.open(temp.path()).unwrap();
        assert!(a.same_stream(&b));
        assert_eq!(registry.live_streams(), 1);

        drop(a);
        drop(b);
        assert_eq!(registry.live_streams(), 0);

        let c = registry.open(temp.path()).unwrap();
        assert!(!c.is_closed());
    }
}
