#![no_main]
use bundle_rs::{Bundle, Ownership, SharedStream, StandardCodec};
use libfuzzer_sys::fuzz_target;
use std::io::Cursor;
use std::sync::Arc;

// Arbitrary bytes must either fail to open or read back without panicking
fuzz_target!(|data: &[u8]| {
    let bundle = match Bundle::open(
        SharedStream::new(Cursor::new(data.to_vec())),
        Ownership::Owned,
        Arc::new(StandardCodec),
    ) {
        Ok(b) => b,
        Err(_) => return,
    };

    let size = match bundle.uncompressed_size() {
        Ok(size) => size,
        Err(_) => return,
    };

    if let Ok(content) = bundle.read_all() {
        assert_eq!(content.len() as u64, size);
    }

    let _ = bundle.read_range(size / 3, (size / 2) as usize);
    let _ = bundle.read_all_cached_with(|bytes| bytes.len());
    let _ = bundle.verify();
});
