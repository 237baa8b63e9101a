#![no_main]

use libfuzzer_sys::fuzz_target;

/// Larger inputs only exercise the length check.
const MAX_INPUT_SIZE: usize = 64 * 1024;

fuzz_target!(|data: &[u8]| {
    let data = &data[..data.len().min(MAX_INPUT_SIZE)];
    if let Ok(packet) = jdwgate_jdwp::decode_packet_bytes(data) {
        let bytes = jdwgate_jdwp::encode(&packet).expect("decoded packets re-encode");
        assert_eq!(bytes, data, "decode/encode must be lossless");
    }
});
