#![no_main]
use bundle_rs::{Bundle, BundleConfig, Compressor, Ownership, SharedStream, StandardCodec};
use libfuzzer_sys::{
    arbitrary::{Arbitrary, Unstructured},
    fuzz_target,
};
use std::io::Cursor;
use std::sync::Arc;

#[derive(Debug, Arbitrary)]
struct Input {
    chunk_size: u16,
    compressor: u8,
    level: i8,
    content: Vec<u8>,
    reads: Vec<(u16, u16)>,
}

fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);
    let input: Input = match u.arbitrary() {
        Ok(input) => input,
        Err(_) => return,
    };

    let compressor = match input.compressor % 3 {
        0 => Compressor::None,
        1 => Compressor::Lz4,
        _ => Compressor::Zstd,
    };
    let config = BundleConfig::default()
        .with_chunk_size(input.chunk_size.max(1) as u32)
        .with_compressor(compressor)
        .with_compression_level((input.level as i32).clamp(-7, 19));

    let bundle = Bundle::create(
        SharedStream::new(Cursor::new(Vec::new())),
        Ownership::Owned,
        Arc::new(StandardCodec),
        &config,
    )
    .unwrap();
    bundle.save(&input.content, config.compression_level).unwrap();

    assert_eq!(bundle.read_all().unwrap(), input.content);

    let len = input.content.len();
    for (start, span) in input.reads.iter().take(16) {
        let offset = if len == 0 { 0 } else { *start as usize % (len + 1) };
        let length = (*span as usize).min(len - offset);
        let expected = &input.content[offset..offset + length];

        assert_eq!(&*bundle.read_range(offset as u64, length).unwrap(), expected);
        assert_eq!(bundle.read_range_cached(offset as u64, length).unwrap(), expected);
    }
});
