#![no_main]
use std::io::Cursor;

use deltabridge::bridge::{Bridge, Input};
use deltabridge::engine::EngineOptions;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }

    // First byte: bits 0-3 level, bit 4 seekable base, bits 5-7 window size.
    let flags = data[0];
    let payload = &data[1..];
    let opts = EngineOptions {
        level: u32::from(flags & 0x0f) % 10,
        window_size: 16 << (flags >> 5),
        source_block_size: 32,
        ..Default::default()
    };
    let seekable = flags & 0x10 != 0;
    let (base, target) = payload.split_at(payload.len() / 2);
    let bridge = Bridge::with_options(opts);

    let mut delta = Vec::new();
    bridge
        .encode(
            Input::reader(&mut &base[..]),
            Input::reader(&mut &target[..]),
            &mut delta,
        )
        .unwrap();

    let mut decoded = Vec::new();
    let mut seekable_base = Cursor::new(base);
    let mut sequential_base = base;
    let base_input = if seekable {
        Input::seekable(&mut seekable_base)
    } else {
        Input::reader(&mut sequential_base)
    };
    bridge
        .decode(base_input, Input::reader(&mut &delta[..]), &mut decoded)
        .unwrap();
    assert_eq!(decoded, target);
});
