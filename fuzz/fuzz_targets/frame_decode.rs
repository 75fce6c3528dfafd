#![no_main]
use blocknet::networking::frame::{encode_frame, FrameReader};
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes must never panic the reader, and every frame it returns
// must re-encode to exactly the bytes it consumed.
fuzz_target!(|data: &[u8]| {
    futures::executor::block_on(async {
        let mut r = FrameReader::new(data, 1 << 16);
        let mut reencoded = Vec::new();
        while let Ok(Some(p)) = r.next_frame().await {
            assert!(!p.is_empty());
            reencoded.extend(encode_frame(&p));
        }
        assert!(reencoded.len() <= data.len());
    });
});
