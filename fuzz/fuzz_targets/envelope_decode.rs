#![no_main]

use libfuzzer_sys::fuzz_target;

use pixelroom::sync::{decode_envelope, encode_envelope};

fuzz_target!(|data: &[u8]| {
    let Ok(envelope) = decode_envelope(data) else {
        return;
    };
    // Compared as bytes: decoded floats may be NaN.
    let bytes = encode_envelope(&envelope).expect("re-encode");
    let again = decode_envelope(&bytes).expect("re-decode");
    assert_eq!(encode_envelope(&again).expect("re-encode twice"), bytes);
});
