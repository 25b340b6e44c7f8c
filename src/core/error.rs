use crate::compression::CodecError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleError {
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid bundle header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported compressor id: {0}")]
    UnsupportedCompressor(u32),

    #[error("Bundle truncated: expected at least {expected} bytes, stream has {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("Range out of bounds: offset {offset} + length {length} exceeds size {size}")]
    OutOfRange { offset: u64, length: u64, size: u64 },

    #[error("Destination buffer too small: need {required} bytes, got {actual}")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("Content too large for bundle format: {0} bytes")]
    TooLarge(u64),

    #[error("Chunk {chunk} is corrupt: decoded {actual} bytes, expected {expected}")]
    CorruptChunk {
        chunk: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to decode chunk {chunk}: {source}")]
    Decode {
        chunk: usize,
        #[source]
        source: CodecError,
    },

    #[error("Failed to encode chunk {chunk}: {source}")]
    Encode {
        chunk: usize,
        #[source]
        source: CodecError,
    },

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Bundle has been disposed")]
    Disposed,

    #[error("Bundle not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BundleError {
    /// True for errors caused by bundle content that does not decode as written
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            BundleError::CorruptChunk { .. } | BundleError::Decode { .. }
        )
    }

    /// True for errors rejected before any I/O because the request itself is invalid
    pub fn is_range_error(&self) -> bool {
        matches!(
            self,
            BundleError::OutOfRange { .. }
                | BundleError::BufferTooSmall { .. }
                | BundleError::TooLarge(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BundleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let corrupt = BundleError::CorruptChunk {
            chunk: 3,
            expected: 4,
            actual: 2,
        };
        assert!(corrupt.is_corruption());
        assert!(!corrupt.is_range_error());
        assert_eq!(
            corrupt.to_string(),
            "Chunk 3 is corrupt: decoded 2 bytes, expected 4"
        );

        let range = BundleError::OutOfRange {
            offset: 8,
            length: 4,
            size: 10,
        };
        assert!(range.is_range_error());
        assert!(!range.is_corruption());

        assert!(!BundleError::Disposed.is_corruption());
    }
}
