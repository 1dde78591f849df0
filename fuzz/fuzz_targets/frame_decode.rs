#![no_main]

use libfuzzer_sys::fuzz_target;

use pixelroom::sync::decode_frame;
use pixelroom::sync::frame::DEFAULT_MAX_FRAME_BYTES;

fuzz_target!(|data: &[u8]| {
    let _ = decode_frame(data, DEFAULT_MAX_FRAME_BYTES);
});
