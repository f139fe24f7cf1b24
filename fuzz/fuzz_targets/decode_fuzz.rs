#![no_main]
use std::io::Cursor;

use deltabridge::bridge::{self, Input};
use deltabridge::vcdiff::decode_memory;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary deltas must only ever produce errors, never panics.
    let _ = decode_memory(data, &[]);

    if data.len() >= 2 {
        let (base, delta) = data.split_at(data.len() / 2);
        let _ = decode_memory(delta, base);

        // Same bytes through the bridge, once with a sequential base and
        // delta, once with both seekable.
        let mut out = Vec::new();
        let _ = bridge::decode(
            Input::reader(&mut &base[..]),
            Input::reader(&mut &delta[..]),
            &mut out,
        );
        out.clear();
        let _ = bridge::decode(
            Input::seekable(&mut Cursor::new(base)),
            Input::seekable(&mut Cursor::new(delta)),
            &mut out,
        );
    }
});
