//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod attrs;
mod decode;
mod keepalive;
mod nlri;
mod notification;
mod open;
mod route_refresh;
mod tlv;
mod update;

use std::sync::Arc;

use holo_bgp::neighbor::PeerType;
use holo_bgp::packet::message::{
    DecodeCxt, EncodeCxt, Message, NegotiatedCapability,
};
use holo_bgp::registry::CodecRegistry;
use holo_utils::assert_eq_hex;

//
// Helper functions.
//

fn encode_cxt() -> EncodeCxt {
    EncodeCxt {
        capabilities: [NegotiatedCapability::FourOctetAsNumber].into(),
        registry: Arc::new(CodecRegistry::with_defaults()),
    }
}

fn decode_cxt(peer_type: PeerType) -> DecodeCxt {
    DecodeCxt {
        peer_type,
        peer_as: 65550,
        capabilities: [NegotiatedCapability::FourOctetAsNumber].into(),
        registry: Arc::new(CodecRegistry::with_defaults()),
    }
}

fn test_encode_msg(bytes_expected: &[u8], msg: &Message) {
    let bytes_actual = msg.encode(&encode_cxt());
    assert_eq_hex!(bytes_expected, bytes_actual);
}

fn test_decode_msg(bytes: &[u8], msg_expected: &Message) {
    test_decode_msg_from(bytes, msg_expected, PeerType::Internal);
}

fn test_decode_msg_from(
    bytes: &[u8],
    msg_expected: &Message,
    peer_type: PeerType,
) {
    let msg_size = Message::get_message_len(bytes)
        .expect("Buffer doesn't contain a full BGP message");
    let msg_actual =
        Message::decode(&bytes[0..msg_size], &decode_cxt(peer_type)).unwrap();
    assert_eq!(*msg_expected, msg_actual);
}
