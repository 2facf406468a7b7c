#![no_main]

use bytes::Bytes;
use holo_bgp::packet::nlri::decode_ipv4_prefix;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = Bytes::copy_from_slice(data);
    let _ = decode_ipv4_prefix(&mut buf);
});
