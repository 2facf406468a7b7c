//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use bytes::Bytes;
use holo_bgp::packet::consts::AfiSafi;
use holo_bgp::packet::error::TlvError;
use holo_bgp::packet::tlv::{InfoTlv, PeerReport, StatTlv};
use holo_bgp::registry::CodecRegistry;
use holo_utils::assert_eq_hex;

static REPORT1: Lazy<(Vec<u8>, PeerReport)> = Lazy::new(|| {
    (
        vec![
            0x00, 0x0c, 0x00, 0x02, 0x00, 0x08, 0x31, 0x30, 0x2e, 0x30, 0x2e,
            0x30, 0x2e, 0x32, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x04,
            0x00, 0x00, 0x00, 0x02, 0x00, 0x07, 0x00, 0x08, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x09, 0x00, 0x0b, 0x00, 0x02,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05,
        ],
        PeerReport {
            info: vec![InfoTlv::Name("10.0.0.2".to_owned())],
            stats: vec![
                StatTlv::RejectedPrefixes(2),
                StatTlv::AdjRibInRoutes(5),
                StatTlv::PerAfiSafiAdjRibIn {
                    afi_safi: AfiSafi::Ipv6Unicast,
                    routes: 5,
                },
            ],
        },
    )
});

fn registry() -> CodecRegistry {
    CodecRegistry::with_defaults()
}

#[test]
fn test_encode_report1() {
    let (ref bytes, ref report) = *REPORT1;
    assert_eq_hex!(bytes, report.encode(&registry()));
}

#[test]
fn test_decode_report1() {
    let (ref bytes, ref report) = *REPORT1;
    let mut buf = Bytes::copy_from_slice(bytes);
    assert_eq!(PeerReport::decode(&mut buf, &registry()), Ok(report.clone()));
}

#[test]
fn test_decode_unknown_stat() {
    // Unregistered statistics types are skipped.
    let mut buf = Bytes::from_static(&[
        0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x63, 0x00, 0x02, 0xab, 0xcd,
        0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01,
    ]);
    assert_eq!(
        PeerReport::decode(&mut buf, &registry()),
        Ok(PeerReport {
            info: vec![],
            stats: vec![StatTlv::RejectedPrefixes(1)],
        })
    );
}

#[test]
fn test_decode_counter_length_mismatch() {
    let mut buf = Bytes::from_static(&[
        0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00,
        0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
    ]);
    assert_eq!(
        PeerReport::decode(&mut buf, &registry()),
        Err(TlvError::InvalidLength {
            tlv_type: 0,
            length: 8,
        })
    );
}

#[test]
fn test_decode_invalid_afi_safi() {
    let mut buf = Bytes::from_static(&[
        0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x0a, 0x00, 0x0b, 0x00, 0x09,
        0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
    ]);
    assert_eq!(
        PeerReport::decode(&mut buf, &registry()),
        Err(TlvError::InvalidAfiSafi { afi: 9, safi: 1 })
    );
}

#[test]
fn test_decode_truncated() {
    // Stats count announces more TLVs than present.
    let mut buf = Bytes::from_static(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x01]);
    assert_eq!(
        PeerReport::decode(&mut buf, &registry()),
        Err(TlvError::ReadOutOfBounds)
    );
}
