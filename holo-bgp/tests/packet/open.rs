//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::LazyLock as Lazy;

use holo_bgp::neighbor::PeerType;
use holo_bgp::packet::consts::{AddPathMode, Afi, BGP_VERSION, GrFlags, Safi};
use holo_bgp::packet::error::{DecodeError, OpenMessageError};
use holo_bgp::packet::message::{
    AddPathTuple, Capability, GrTuple, Message, OpenMsg,
};

use super::{decode_cxt, test_decode_msg, test_encode_msg};

static OPEN1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x1d, 0x01, 0x04, 0xfd, 0xe8,
            0x00, 0x5a, 0x01, 0x01, 0x01, 0x01, 0x00,
        ],
        Message::Open(OpenMsg {
            version: BGP_VERSION,
            my_as: 65000,
            holdtime: 90,
            identifier: Ipv4Addr::from_str("1.1.1.1").unwrap(),
            capabilities: [].into(),
        }),
    )
});

static OPEN2: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x2d, 0x01, 0x04, 0xfd, 0xe8,
            0x00, 0x5a, 0x0a, 0x00, 0x00, 0x01, 0x10, 0x02, 0x06, 0x01, 0x04,
            0x00, 0x01, 0x00, 0x01, 0x02, 0x06, 0x41, 0x04, 0x00, 0x00, 0xfd,
            0xe8,
        ],
        Message::Open(OpenMsg {
            version: BGP_VERSION,
            my_as: 65000,
            holdtime: 90,
            identifier: Ipv4Addr::from_str("10.0.0.1").unwrap(),
            capabilities: [
                Capability::MultiProtocol {
                    afi: Afi::Ipv4,
                    safi: Safi::Unicast,
                },
                Capability::FourOctetAsNumber { asn: 65000 },
            ]
            .into(),
        }),
    )
});

static OPEN3: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x3f, 0x01, 0x04, 0x5b, 0xa0,
            0x00, 0xb4, 0x02, 0x02, 0x02, 0x02, 0x22, 0x02, 0x06, 0x01, 0x04,
            0x00, 0x02, 0x00, 0x01, 0x02, 0x06, 0x41, 0x04, 0xfa, 0x56, 0xea,
            0x00, 0x02, 0x06, 0x45, 0x04, 0x00, 0x01, 0x01, 0x03, 0x02, 0x08,
            0x40, 0x06, 0x80, 0x78, 0x00, 0x02, 0x01, 0x80,
        ],
        Message::Open(OpenMsg {
            version: BGP_VERSION,
            my_as: 23456,
            holdtime: 180,
            identifier: Ipv4Addr::from_str("2.2.2.2").unwrap(),
            capabilities: [
                Capability::MultiProtocol {
                    afi: Afi::Ipv6,
                    safi: Safi::Unicast,
                },
                Capability::FourOctetAsNumber { asn: 4200000000 },
                Capability::AddPath(
                    [AddPathTuple {
                        afi: Afi::Ipv4,
                        safi: Safi::Unicast,
                        mode: AddPathMode::ReceiveSend,
                    }]
                    .into(),
                ),
                Capability::GracefulRestart {
                    flags: GrFlags::RESTART_STATE,
                    restart_time: 120,
                    afi_safis: [GrTuple {
                        afi: Afi::Ipv6,
                        safi: Safi::Unicast,
                        forwarding: true,
                    }]
                    .into(),
                },
            ]
            .into(),
        }),
    )
});

#[test]
fn test_encode_open1() {
    let (ref bytes, ref msg) = *OPEN1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_open1() {
    let (ref bytes, ref msg) = *OPEN1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_open2() {
    let (ref bytes, ref msg) = *OPEN2;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_open2() {
    let (ref bytes, ref msg) = *OPEN2;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_encode_open3() {
    let (ref bytes, ref msg) = *OPEN3;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_open3() {
    let (ref bytes, ref msg) = *OPEN3;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_open_real_as() {
    let (_, ref msg) = *OPEN1;
    assert_eq!(msg.as_open().unwrap().real_as(), 65000);

    let (_, ref msg) = *OPEN3;
    assert_eq!(msg.as_open().unwrap().real_as(), 4200000000);
}

#[test]
fn test_open_implied_ipv4_unicast() {
    let (_, ref msg) = *OPEN1;
    assert_eq!(
        msg.as_open().unwrap().afi_safis(),
        [(Afi::Ipv4, Safi::Unicast)].into()
    );

    let (_, ref msg) = *OPEN3;
    assert_eq!(
        msg.as_open().unwrap().afi_safis(),
        [(Afi::Ipv6, Safi::Unicast)].into()
    );
}

#[test]
fn test_decode_open_unacceptable_holdtime() {
    let (ref bytes, _) = *OPEN1;
    let mut bytes = bytes.clone();
    // Hold time of 1 second.
    bytes[22..24].copy_from_slice(&[0x00, 0x01]);

    let result = Message::decode(&bytes, &decode_cxt(PeerType::Internal));
    assert!(matches!(
        result,
        Err(DecodeError::OpenMessage(
            OpenMessageError::UnacceptableHoldTime
        ))
    ));
}

#[test]
fn test_decode_open_bad_identifier() {
    let (ref bytes, _) = *OPEN1;
    let mut bytes = bytes.clone();
    bytes[24..28].copy_from_slice(&[0x00, 0x00, 0x00, 0x00]);

    let result = Message::decode(&bytes, &decode_cxt(PeerType::Internal));
    assert!(matches!(
        result,
        Err(DecodeError::OpenMessage(OpenMessageError::BadBgpIdentifier))
    ));
}
