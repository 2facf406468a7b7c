//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

use std::sync::LazyLock as Lazy;

use holo_bgp::neighbor::PeerType;
use holo_bgp::packet::error::{DecodeError, MessageHeaderError};
use holo_bgp::packet::message::{KeepaliveMsg, Message};

use super::{decode_cxt, test_decode_msg, test_encode_msg};

static KEEPALIVE1: Lazy<(Vec<u8>, Message)> = Lazy::new(|| {
    (
        vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
            0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x13, 0x04,
        ],
        Message::Keepalive(KeepaliveMsg {}),
    )
});

#[test]
fn test_encode_keepalive1() {
    let (ref bytes, ref msg) = *KEEPALIVE1;
    test_encode_msg(bytes, msg);
}

#[test]
fn test_decode_keepalive1() {
    let (ref bytes, ref msg) = *KEEPALIVE1;
    test_decode_msg(bytes, msg);
}

#[test]
fn test_decode_keepalive_bad_length() {
    let bytes = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x14, 0x04, 0x00,
    ];
    let result = Message::decode(&bytes, &decode_cxt(PeerType::Internal));
    assert!(matches!(
        result,
        Err(DecodeError::MessageHeader(
            MessageHeaderError::BadMessageLength(20)
        ))
    ));
}

#[test]
fn test_decode_bad_marker() {
    let (ref bytes, _) = *KEEPALIVE1;
    let mut bytes = bytes.clone();
    bytes[3] = 0x00;
    let result = Message::decode(&bytes, &decode_cxt(PeerType::Internal));
    assert!(matches!(
        result,
        Err(DecodeError::MessageHeader(
            MessageHeaderError::ConnectionNotSynchronized
        ))
    ));
}

#[test]
fn test_message_len_framing() {
    let (ref bytes, _) = *KEEPALIVE1;

    // Incomplete header.
    assert_eq!(Message::get_message_len(&bytes[..18]), None);

    // Two messages back to back.
    let mut stream = bytes.clone();
    stream.extend_from_slice(bytes);
    assert_eq!(Message::get_message_len(&stream), Some(19));
}
