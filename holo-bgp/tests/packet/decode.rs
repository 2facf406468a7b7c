//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use arbitrary::{Arbitrary, Unstructured};
use holo_bgp::neighbor::PeerType;
use holo_bgp::packet::error::DecodeError;
use holo_bgp::packet::message::{DecodeCxt, Message};

use super::decode_cxt;

// Valid eBGP UPDATE used as a base for the truncation tests.
const UPDATE: [u8; 47] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0xff, 0xff, 0xff, 0x00, 0x2f, 0x02, 0x00, 0x00, 0x00, 0x14, 0x40,
    0x01, 0x01, 0x00, 0x40, 0x02, 0x06, 0x02, 0x01, 0x00, 0x01, 0x00, 0x0e,
    0x40, 0x03, 0x04, 0xc0, 0x00, 0x02, 0x01, 0x18, 0x0a, 0x00, 0x00,
];

#[test]
fn arbitrary_context() {
    // Same input the fuzz target sees: the decode context comes first, the
    // message bytes after.
    let data = [
        0x01, 0x00, 0x00, 0xfd, 0xe8, 0x03, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0x00, 0x13, 0x04,
    ];
    let mut u = Unstructured::new(&data);
    if let Ok(cxt) = DecodeCxt::arbitrary(&mut u) {
        let bytes = u.take_rest();
        if let Some(len) = Message::get_message_len(bytes) {
            let _ = Message::decode(&bytes[..len], &cxt);
        }
    }
}

#[test]
fn truncated_update() {
    // Shrink the message while keeping the length field consistent with the
    // buffer. No truncation point may cause a panic.
    let cxt = decode_cxt(PeerType::External);
    for len in 19..UPDATE.len() {
        let mut bytes = UPDATE[..len].to_vec();
        bytes[16..18].copy_from_slice(&(len as u16).to_be_bytes());
        let _ = Message::decode(&bytes, &cxt);
    }
}

#[test]
fn length_beyond_buffer() {
    let cxt = decode_cxt(PeerType::External);
    let mut bytes = UPDATE.to_vec();
    bytes[16..18].copy_from_slice(&200u16.to_be_bytes());
    assert_eq!(Message::get_message_len(&bytes), None);
    assert!(matches!(
        Message::decode(&bytes, &cxt),
        Err(DecodeError::MessageHeader(_))
    ));
}

#[test]
fn withdrawn_length_overflow() {
    let cxt = decode_cxt(PeerType::External);
    let mut bytes = UPDATE.to_vec();
    bytes[19..21].copy_from_slice(&[0x00, 0xff]);
    assert!(matches!(
        Message::decode(&bytes, &cxt),
        Err(DecodeError::UpdateMessage(_))
    ));
}
