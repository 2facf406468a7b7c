#![no_main]

use bytes::Bytes;
use holo_bgp::packet::message::OpenMsg;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = Bytes::copy_from_slice(data);
    let _ = OpenMsg::decode(&mut buf);
});
