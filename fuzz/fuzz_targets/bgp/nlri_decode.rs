#![no_main]

use bytes::Bytes;
use holo_bgp::packet::consts::AfiSafi;
use holo_bgp::packet::nlri::Nlri;
use libfuzzer_sys::arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut u = Unstructured::new(data);

    if let Ok(afi_safi) = AfiSafi::arbitrary(&mut u) {
        let mut buf = Bytes::copy_from_slice(u.take_rest());
        let _ = Nlri::decode(afi_safi, &mut buf);
    }
});
