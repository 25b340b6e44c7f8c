//! Index-layer records linked to a bundle
//!
//! The path index owns records that name a bundle and mirror its logical size.
//! A bundle only keeps the mirrored size current; it never creates or drops
//! the record itself.

use std::sync::atomic::{AtomicU64, Ordering};

/// Receiver for a bundle's uncompressed size
pub trait SizeRecord: Send + Sync {
    fn set_uncompressed_size(&self, size: u64);
}

impl SizeRecord for AtomicU64 {
    fn set_uncompressed_size(&self, size: u64) {
        self.store(size, Ordering::Release);
    }
}

/// Minimal index record: a bundle name plus its mirrored size
#[derive(Debug)]
pub struct BundleRecord {
    name: String,
    uncompressed_size: AtomicU64,
}

impl BundleRecord {
    pub fn new(name: impl Into<String>) -> Self {
        BundleRecord {
            name: name.into(),
            uncompressed_size: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size.load(Ordering::Acquire)
    }
}

impl SizeRecord for BundleRecord {
    fn set_uncompressed_size(&self, size: u64) {
        self.uncompressed_size.set_uncompressed_size(size);
    }
}
