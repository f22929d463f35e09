//! Fuzz target for wire record decoding.
//!
//! Arbitrary bytes must never crash the decoder. Anything it accepts must
//! encode back to the same bytes.

#![no_main]

use hot_potato::network::codec::{decode_message, encode_message};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(msg) = decode_message(data) {
        let encoded = encode_message(&msg).expect("decoded message must encode");
        assert_eq!(&encoded[..], data, "decode/encode must be lossless");
    }
});
