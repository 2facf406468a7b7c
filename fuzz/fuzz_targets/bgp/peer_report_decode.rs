#![no_main]

use bytes::Bytes;
use holo_bgp::packet::tlv::PeerReport;
use holo_bgp::registry::CodecRegistry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let registry = CodecRegistry::with_defaults();
    let mut buf = Bytes::copy_from_slice(data);
    let _ = PeerReport::decode(&mut buf, &registry);
});
